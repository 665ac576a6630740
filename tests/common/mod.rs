#![allow(dead_code)]

pub use mcprod_test_utils::builders;
pub use mcprod_test_utils::fakes;
pub use mcprod_test_utils::{init_tracing, with_timeout};
