use proptest::prelude::*;

use mcprod::host::Metadata;
use mcprod::planner::{plan_stage, Basename, Datatype, InputMetadata, LfnRecord, StageSpec};

fn datatype() -> impl Strategy<Value = Datatype> {
    prop_oneof![
        Just(Datatype::Gen),
        Just(Datatype::Sim),
        Just(Datatype::Rec),
        Just(Datatype::Dst),
    ]
}

fn record() -> impl Strategy<Value = LfnRecord> {
    (
        "/ilc/prod/[a-z]{1,6}",
        datatype(),
        1u32..5000,
        "[A-Za-z][A-Za-z0-9_]{0,8}",
        "[a-z][a-z0-9_]{0,8}",
        "[a-z][a-z0-9_]{0,8}",
        proptest::option::of("ILD_[a-z0-9_]{1,8}"),
        "v[0-9]{2}-[0-9]{2}(-p[0-9]{2})?",
        1u64..100_000_000,
        0u64..10_000_000,
        1u32..1_000_000,
        proptest::option::of(prop_oneof![Just("L"), Just("R"), Just("B")]),
    )
        .prop_map(
            |(basepath, datatype, energy, machine, evt_class, evt_type, detector, config, prod_id, job_id, process_id, pol)| {
                let is_gen = datatype == Datatype::Gen;
                let detector = if is_gen { None } else { detector };
                let config = (!is_gen).then_some(config);
                let basename = Basename {
                    sim_config: config.clone(),
                    detector: detector.clone(),
                    energy: energy.to_string(),
                    machine: machine.clone(),
                    process_id: process_id.to_string(),
                    process: evt_type.clone(),
                    pol1: pol.map(str::to_string),
                    ..Basename::default()
                };
                LfnRecord {
                    basepath,
                    datatype,
                    energy: energy.to_string(),
                    machine,
                    evt_class,
                    evt_type,
                    detector,
                    config,
                    prod_id,
                    job_id,
                    basename: basename.to_string(),
                }
            },
        )
}

fn input_metadata() -> impl Strategy<Value = Metadata> {
    (
        1u32..5000,
        "[A-Za-z][A-Za-z0-9_]{0,8}",
        1u32..1_000_000,
        "[a-z][a-z0-9_]{0,8}",
        "[a-z][a-z0-9]{0,8}",
        prop_oneof![Just("L"), Just("R"), Just("B")],
        any::<bool>(),
    )
        .prop_map(|(energy, machine, process_id, evt_type, evt_class, pol, with_detector)| {
            let mut meta = Metadata::from([
                ("Energy".to_string(), energy.to_string()),
                ("MachineParams".to_string(), machine),
                ("GenProcessID".to_string(), process_id.to_string()),
                ("EvtType".to_string(), evt_type),
                ("EvtClass".to_string(), evt_class),
                ("PolarizationB1".to_string(), pol.to_string()),
                ("ILDConfig".to_string(), "v02-00-02".to_string()),
            ]);
            if with_detector {
                meta.insert("DetectorModel".to_string(), "ILD_l5_o1_v02".to_string());
            }
            meta
        })
}

proptest! {
    #[test]
    fn built_lfns_parse_back(record in record()) {
        let lfn = record.build_lfn();
        let parsed = LfnRecord::parse_lfn(&lfn)
            .map_err(|e| TestCaseError::fail(format!("{lfn}: {e}")))?;
        prop_assert_eq!(parsed, record);
    }

    #[test]
    fn planning_is_deterministic(meta in input_metadata(), datatype in datatype()) {
        let stage = StageSpec::new("app", datatype)
            .with_config("v02-00-02")
            .with_software_tag("ILCSoft-02-00-02");

        // Two independent parses of the same metadata.
        let first = InputMetadata::from_metadata(&meta)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let second = InputMetadata::from_metadata(&meta.clone())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let a = plan_stage(&first, &stage, "/ilc/prod/ilc/mc-2020", None)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let b = plan_stage(&second, &stage, "/ilc/prod/ilc/mc-2020/", None)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(a.iter().all(|plan| plan.final_meta.values().all(|m| m.len() == 1)));
        prop_assert_eq!(a, b);
    }
}
