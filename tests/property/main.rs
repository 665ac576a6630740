// tests/property/main.rs

mod planner;
mod recovery;
