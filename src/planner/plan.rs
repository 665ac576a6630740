// src/planner/plan.rs

use std::collections::BTreeMap;

use tracing::debug;

use super::basename::Basename;
use super::lfn::{prod_dir_name, Datatype, LfnRecord};
use super::PlannerError;
use crate::errors::Result;
use crate::host::{FileCatalogClient, Metadata};
use crate::types::{JobId, TransId};

/// Metadata of the production input, read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputMetadata {
    pub energy: String,
    pub machine: String,
    pub process_id: String,
    pub evt_type: String,
    /// `EvtClass`, falling back to `GenProcessType`.
    pub evt_class: Option<String>,
    pub process_name: Option<String>,
    pub detector: Option<String>,
    /// `ILDConfig` of the input, i.e. the simulation config for reconstruction.
    pub ild_config: Option<String>,
    pub pol1: Option<String>,
    pub pol2: Option<String>,
    pub beam1: Option<String>,
    pub beam2: Option<String>,
    pub datatype: Option<Datatype>,
}

fn first_of(meta: &Metadata, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| meta.get(*k))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

impl InputMetadata {
    pub fn from_metadata(meta: &Metadata) -> std::result::Result<Self, PlannerError> {
        let energy = first_of(meta, &["Energy"]).ok_or(PlannerError::MissingMetadata("Energy"))?;
        let value: u64 = energy
            .parse()
            .map_err(|_| PlannerError::InvalidEnergy(energy.clone()))?;
        if value == 0 {
            return Err(PlannerError::ZeroEnergy);
        }

        let datatype = match first_of(meta, &["Datatype"]) {
            Some(dt) => Some(dt.parse()?),
            None => None,
        };

        Ok(Self {
            energy: value.to_string(),
            machine: first_of(meta, &["MachineParams"])
                .ok_or(PlannerError::MissingMetadata("MachineParams"))?,
            process_id: first_of(meta, &["GenProcessID", "ProcessID"])
                .ok_or(PlannerError::MissingMetadata("ProcessID"))?,
            evt_type: first_of(meta, &["EvtType", "GenProcessType"])
                .ok_or(PlannerError::MissingMetadata("EvtType"))?,
            evt_class: first_of(meta, &["EvtClass", "GenProcessType"]),
            process_name: first_of(meta, &["GenProcessName"]),
            detector: first_of(meta, &["DetectorModel"]),
            ild_config: first_of(meta, &["ILDConfig"]),
            pol1: first_of(meta, &["PolarizationB1"]),
            pol2: first_of(meta, &["PolarizationB2"]),
            beam1: first_of(meta, &["BeamParticle1"]),
            beam2: first_of(meta, &["BeamParticle2"]),
            datatype,
        })
    }

    /// Resolve a metadata query against the catalog: directory metadata of the
    /// first matching directory, overridden by the metadata of a
    /// representative file in it.
    pub fn resolve(catalog: &dyn FileCatalogClient, query: &Metadata) -> Result<Self> {
        let dirs = catalog.find_directories_by_metadata(query)?;
        let dir = dirs.first().ok_or(PlannerError::NoInputFiles)?;
        let files = catalog.find_files_by_metadata(query, dir)?;
        let file = files.first().ok_or(PlannerError::NoInputFiles)?;
        debug!(dir = %dir, lfn = %file, "resolved input query");

        let mut meta = catalog.get_directory_user_metadata(dir)?;
        meta.extend(catalog.get_file_user_metadata(file)?);

        let input = Self::from_metadata(&meta)?;
        if input.datatype.is_none() {
            return Err(PlannerError::MissingMetadata("Datatype").into());
        }
        Ok(input)
    }

    fn process(&self) -> &str {
        self.process_name.as_deref().unwrap_or(&self.evt_type)
    }
}

/// One application of a production chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub application: String,
    /// `Gen`, `Sim` or `Rec`; a `Rec` stage also writes `Dst`.
    pub datatype: Datatype,
    /// `ILDConfig` of this stage, mandatory for sim and rec.
    pub config: Option<String>,
    /// Overrides the detector of the input.
    pub detector: Option<String>,
    pub software_tag: Option<String>,
    /// Explicit `OutputFile`; defaults to `{basename}_{dt}.{ext}`.
    pub output_file: Option<String>,
}

impl StageSpec {
    pub fn new(application: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            application: application.into(),
            datatype,
            config: None,
            detector: None,
            software_tag: None,
            output_file: None,
        }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }

    pub fn with_detector(mut self, detector: impl Into<String>) -> Self {
        self.detector = Some(detector.into());
        self
    }

    pub fn with_software_tag(mut self, tag: impl Into<String>) -> Self {
        self.software_tag = Some(tag.into());
        self
    }

    pub fn with_output_file(mut self, name: impl Into<String>) -> Self {
        self.output_file = Some(name.into());
        self
    }
}

/// Computed outputs and metadata claims of one stage and datatype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPlan {
    pub application: String,
    pub datatype: Datatype,
    pub basepath: String,
    pub energy: String,
    pub machine: String,
    pub evt_class: String,
    pub evt_type: String,
    pub detector: Option<String>,
    pub config: Option<String>,
    pub basename: String,
    pub output_file: String,
    /// Directory path (no trailing slash) to the metadata claimed on it.
    pub final_meta: BTreeMap<String, Metadata>,
    /// Claimed on the production directory together with `ProdID`.
    pub prod_meta: Metadata,
}

impl MetadataPlan {
    fn record(&self, prod_id: TransId, job_id: JobId) -> LfnRecord {
        LfnRecord {
            basepath: self.basepath.clone(),
            datatype: self.datatype,
            energy: self.energy.clone(),
            machine: self.machine.clone(),
            evt_class: self.evt_class.clone(),
            evt_type: self.evt_type.clone(),
            detector: self.detector.clone(),
            config: self.config.clone(),
            prod_id,
            job_id,
            basename: self.basename.clone(),
        }
    }

    /// Deepest stage directory, with a trailing slash.
    pub fn output_dir(&self) -> String {
        self.record(0, 0).output_dir()
    }

    pub fn prod_dir(&self, prod_id: TransId) -> String {
        format!("{}{}", self.output_dir(), prod_dir_name(prod_id))
    }

    pub fn job_lfn(&self, prod_id: TransId, job_id: JobId) -> String {
        self.record(prod_id, job_id).build_lfn()
    }

    /// All directory claims once the production id is known.
    pub fn claims(&self, prod_id: TransId) -> BTreeMap<String, Metadata> {
        let mut claims = self.final_meta.clone();
        let mut prod = self.prod_meta.clone();
        prod.insert("ProdID".to_string(), prod_id.to_string());
        claims.insert(self.prod_dir(prod_id), prod);
        claims
    }
}

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Plan one stage. Returns one plan per output datatype.
pub fn plan_stage(
    input: &InputMetadata,
    stage: &StageSpec,
    basepath: &str,
    evt_class_override: Option<&str>,
) -> std::result::Result<Vec<MetadataPlan>, PlannerError> {
    if let Some(name) = &stage.output_file {
        if name.contains('/') {
            return Err(PlannerError::InvalidOutputFile(name.clone()));
        }
    }
    if input.energy == "0" {
        return Err(PlannerError::ZeroEnergy);
    }

    let evt_class = evt_class_override
        .map(str::to_string)
        .or_else(|| input.evt_class.clone())
        .ok_or(PlannerError::MissingMetadata("EvtClass"))?;

    let mut basename = Basename {
        energy: input.energy.clone(),
        machine: input.machine.clone(),
        process_id: input.process_id.clone(),
        process: input.process().to_string(),
        pol1: input.pol1.clone(),
        pol2: input.pol2.clone(),
        ..Basename::default()
    };

    let (detector, config, datatypes) = match stage.datatype {
        Datatype::Gen => (None, None, vec![Datatype::Gen]),
        Datatype::Sim | Datatype::Rec | Datatype::Dst => {
            let config = stage.config.clone().ok_or_else(|| PlannerError::MissingIldConfig {
                stage: stage.application.clone(),
            })?;
            let detector = stage.detector.clone().or_else(|| input.detector.clone());
            basename.detector = detector.clone();
            if stage.datatype == Datatype::Sim {
                basename.sim_config = Some(config.clone());
                (detector, Some(config), vec![Datatype::Sim])
            } else {
                let sim_config =
                    input
                        .ild_config
                        .clone()
                        .ok_or_else(|| PlannerError::MissingIldConfig {
                            stage: format!("{} input", stage.application),
                        })?;
                basename.reco_config = Some(config.clone());
                basename.sim_config = Some(sim_config);
                (detector, Some(config), vec![Datatype::Rec, Datatype::Dst])
            }
        }
    };
    basename.validate()?;
    for (key, value) in [("EvtClass", &evt_class), ("EvtType", &input.evt_type)] {
        if value.is_empty() || value.contains('/') {
            return Err(PlannerError::InvalidValue {
                key,
                value: value.clone(),
            });
        }
    }

    let basepath = basepath.trim_end_matches('/').to_string();
    let basename = basename.to_string();

    let plans: Vec<MetadataPlan> = datatypes
        .into_iter()
        .map(|datatype| {
            let dt_dir = format!("{basepath}/{}", datatype.token());
            let energy_dir = format!("{dt_dir}/{}-{}", input.energy, input.machine);
            let class_dir = format!("{energy_dir}/{evt_class}");
            let type_dir = format!("{class_dir}/{}", input.evt_type);

            // One key per directory; everything else goes on the production directory.
            let mut final_meta = BTreeMap::new();
            final_meta.insert(dt_dir, meta(&[("Datatype", datatype.metadata_value())]));
            final_meta.insert(energy_dir, meta(&[("Energy", input.energy.as_str())]));
            final_meta.insert(class_dir, meta(&[("EvtClass", evt_class.as_str())]));
            final_meta.insert(type_dir.clone(), meta(&[("EvtType", input.evt_type.as_str())]));
            let mut leaf = type_dir;
            if let Some(det) = &detector {
                leaf = format!("{leaf}/{det}");
                final_meta.insert(leaf.clone(), meta(&[("DetectorModel", det.as_str())]));
            }
            if let Some(cfg) = &config {
                leaf = format!("{leaf}/{cfg}");
                final_meta.insert(leaf, meta(&[("ILDConfig", cfg.as_str())]));
            }

            let mut prod_meta = meta(&[
                ("GenProcessID", input.process_id.as_str()),
                ("MachineParams", input.machine.as_str()),
            ]);
            let optional = [
                ("GenProcessName", &input.process_name),
                ("PolarizationB1", &input.pol1),
                ("PolarizationB2", &input.pol2),
                ("BeamParticle1", &input.beam1),
                ("BeamParticle2", &input.beam2),
                ("SoftwareTag", &stage.software_tag),
            ];
            for (key, value) in optional {
                if let Some(v) = value {
                    prod_meta.insert(key.to_string(), v.clone());
                }
            }

            let output_file = stage.output_file.clone().unwrap_or_else(|| {
                format!("{basename}_{}.{}", datatype.token(), datatype.extension())
            });

            MetadataPlan {
                application: stage.application.clone(),
                datatype,
                basepath: basepath.clone(),
                energy: input.energy.clone(),
                machine: input.machine.clone(),
                evt_class: evt_class.clone(),
                evt_type: input.evt_type.clone(),
                detector: detector.clone(),
                config: config.clone(),
                basename: basename.clone(),
                output_file,
                final_meta,
                prod_meta,
            }
        })
        .collect();

    Ok(plans)
}

/// Input metadata seen by the stage after `stage`.
pub(crate) fn chain_input(input: &InputMetadata, stage: &StageSpec) -> InputMetadata {
    let mut next = input.clone();
    match stage.datatype {
        Datatype::Gen => {}
        Datatype::Sim => {
            next.ild_config = stage.config.clone();
            next.detector = stage.detector.clone().or_else(|| input.detector.clone());
        }
        Datatype::Rec | Datatype::Dst => {
            next.detector = stage.detector.clone().or_else(|| input.detector.clone());
        }
    }
    next.datatype = Some(stage.datatype);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s5_metadata() -> Metadata {
        meta(&[
            ("Energy", "500"),
            ("MachineParams", "TDR_ws"),
            ("GenProcessID", "37538"),
            ("EvtType", "ae_ell"),
            ("EvtClass", "1f_3f"),
            ("PolarizationB1", "B"),
            ("PolarizationB2", "L"),
            ("DetectorModel", "ILD_o1_v05"),
            ("Datatype", "gen"),
        ])
    }

    #[test]
    fn sim_stage_basename_and_directory() {
        let input = InputMetadata::from_metadata(&s5_metadata()).unwrap();
        let stage = StageSpec::new("ddsim", Datatype::Sim).with_config("v01-14-01-p00");
        let plans = plan_stage(&input, &stage, "/basepath/", None).unwrap();

        assert_eq!(plans.len(), 1);
        let plan = &plans[0];
        assert_eq!(
            plan.basename,
            "sv01-14-01-p00.mILD_o1_v05.E500-TDR_ws.I37538.Pae_ell.eB.pL"
        );
        assert_eq!(
            plan.output_dir(),
            "/basepath/sim/500-TDR_ws/1f_3f/ae_ell/ILD_o1_v05/v01-14-01-p00/"
        );
        assert_eq!(
            plan.output_file,
            "sv01-14-01-p00.mILD_o1_v05.E500-TDR_ws.I37538.Pae_ell.eB.pL_sim.slcio"
        );
        assert_eq!(
            plan.final_meta["/basepath/sim/500-TDR_ws/1f_3f/ae_ell/ILD_o1_v05/v01-14-01-p00"]
                ["ILDConfig"],
            "v01-14-01-p00"
        );
        assert_eq!(plan.final_meta["/basepath/sim"]["Datatype"], "SIM");
    }

    #[test]
    fn every_directory_claims_a_single_key() {
        let mut input = InputMetadata::from_metadata(&s5_metadata()).unwrap();
        input.ild_config = Some("v01-14-01-p00".into());
        let stages = [
            StageSpec::new("whizard", Datatype::Gen),
            StageSpec::new("ddsim", Datatype::Sim).with_config("v01-14-01-p00"),
            StageSpec::new("marlin", Datatype::Rec).with_config("v01-16-p05"),
        ];
        for stage in &stages {
            for plan in plan_stage(&input, stage, "/b", None).unwrap() {
                assert!(
                    plan.final_meta.values().all(|m| m.len() == 1),
                    "{}: {:?}",
                    stage.application,
                    plan.final_meta
                );
                let energy_dir = format!("/b/{}/500-TDR_ws", plan.datatype.token());
                assert_eq!(plan.final_meta[&energy_dir]["Energy"], "500");
                assert_eq!(plan.prod_meta["MachineParams"], "TDR_ws");
            }
        }
    }

    #[test]
    fn detector_is_optional() {
        let mut meta = s5_metadata();
        meta.remove("DetectorModel");
        let input = InputMetadata::from_metadata(&meta).unwrap();
        let stage = StageSpec::new("ddsim", Datatype::Sim).with_config("v01-14-01-p00");
        let plan = plan_stage(&input, &stage, "/basepath", None).unwrap().remove(0);

        assert_eq!(plan.detector, None);
        assert_eq!(plan.basename, "sv01-14-01-p00.E500-TDR_ws.I37538.Pae_ell.eB.pL");
        assert_eq!(
            plan.output_dir(),
            "/basepath/sim/500-TDR_ws/1f_3f/ae_ell/v01-14-01-p00/"
        );
        assert_eq!(
            plan.final_meta["/basepath/sim/500-TDR_ws/1f_3f/ae_ell/v01-14-01-p00"]["ILDConfig"],
            "v01-14-01-p00"
        );
        assert!(!plan.final_meta.values().any(|m| m.contains_key("DetectorModel")));

        let lfn = plan.job_lfn(7, 1234);
        assert_eq!(LfnRecord::parse_lfn(&lfn).unwrap().detector, None);
    }

    #[test]
    fn deepest_claim_is_the_production_id() {
        let input = InputMetadata::from_metadata(&s5_metadata()).unwrap();
        let stage = StageSpec::new("ddsim", Datatype::Sim).with_config("v01-14-01-p00");
        let plan = plan_stage(&input, &stage, "/basepath", None).unwrap().remove(0);

        let claims = plan.claims(42);
        let (deepest, meta) = claims
            .iter()
            .max_by_key(|(dir, _)| dir.matches('/').count())
            .unwrap();
        assert!(deepest.ends_with("/00000042"));
        assert_eq!(meta["ProdID"], "42");
        assert_eq!(meta["GenProcessID"], "37538");
    }

    #[test]
    fn reconstruction_yields_rec_and_dst() {
        let mut input = InputMetadata::from_metadata(&s5_metadata()).unwrap();
        input.ild_config = Some("v01-14-01-p00".into());
        let stage = StageSpec::new("marlin", Datatype::Rec).with_config("v01-16-p05");
        let plans = plan_stage(&input, &stage, "/basepath", None).unwrap();

        let dts: Vec<Datatype> = plans.iter().map(|p| p.datatype).collect();
        assert_eq!(dts, vec![Datatype::Rec, Datatype::Dst]);
        assert!(plans[0].basename.starts_with("rv01-16-p05.sv01-14-01-p00.m"));
        assert!(plans[1].output_dir().starts_with("/basepath/dst/"));
    }

    #[test]
    fn preconditions_are_enforced() {
        let input = InputMetadata::from_metadata(&s5_metadata()).unwrap();

        let no_config = StageSpec::new("ddsim", Datatype::Sim);
        assert!(matches!(
            plan_stage(&input, &no_config, "/b", None),
            Err(PlannerError::MissingIldConfig { .. })
        ));

        let slash = StageSpec::new("ddsim", Datatype::Sim)
            .with_config("v1")
            .with_output_file("a/b.slcio");
        assert!(matches!(
            plan_stage(&input, &slash, "/b", None),
            Err(PlannerError::InvalidOutputFile(_))
        ));

        let mut zero = s5_metadata();
        zero.insert("Energy".into(), "0".into());
        assert_eq!(InputMetadata::from_metadata(&zero), Err(PlannerError::ZeroEnergy));

        let mut no_process = s5_metadata();
        no_process.remove("GenProcessID");
        assert_eq!(
            InputMetadata::from_metadata(&no_process),
            Err(PlannerError::MissingMetadata("ProcessID"))
        );
    }

    #[test]
    fn evt_class_override_wins() {
        let input = InputMetadata::from_metadata(&s5_metadata()).unwrap();
        let stage = StageSpec::new("whizard", Datatype::Gen);
        let plan = plan_stage(&input, &stage, "/b", Some("higgs")).unwrap().remove(0);
        assert_eq!(plan.output_dir(), "/b/gen/500-TDR_ws/higgs/ae_ell/");
        assert_eq!(plan.basename, "E500-TDR_ws.I37538.Pae_ell.eB.pL");
    }
}
