// src/planner/lfn.rs

//! Datatypes and the output LFN layout.
//!
//! ```text
//! {basepath}/{dt}/{energy}-{machine}/{evtclass}/{evttype}/[{detector}/{config}/]
//!     {prodID:08}/{jobID/1000:03}/{basename}_{dt}_{prodID}_{jobID}.{ext}
//! ```
//!
//! Generation outputs carry no detector or config directories; other
//! outputs drop the detector directory when the basename has no detector.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::basename::Basename;
use super::PlannerError;
use crate::types::{JobId, TransId};

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+)_(?P<dt>gen|sim|rec|dst)_(?P<prod>\d+)_(?P<job>\d+)\.(?P<ext>stdhep|slcio)$")
        .expect("static regex")
});

static ENERGY_MACHINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<energy>\d+)-(?P<machine>.+)$").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    Gen,
    Sim,
    Rec,
    Dst,
}

impl Datatype {
    /// Value of the `Datatype` metadata key.
    pub fn metadata_value(&self) -> &'static str {
        match self {
            Datatype::Gen => "gen",
            Datatype::Sim => "SIM",
            Datatype::Rec => "REC",
            Datatype::Dst => "DST",
        }
    }

    /// Lowercase token used in paths and file names.
    pub fn token(&self) -> &'static str {
        match self {
            Datatype::Gen => "gen",
            Datatype::Sim => "sim",
            Datatype::Rec => "rec",
            Datatype::Dst => "dst",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Datatype::Gen => "stdhep",
            _ => "slcio",
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metadata_value())
    }
}

impl FromStr for Datatype {
    type Err = PlannerError;

    /// Accepts both the metadata value and the path token, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gen" => Ok(Datatype::Gen),
            "sim" => Ok(Datatype::Sim),
            "rec" => Ok(Datatype::Rec),
            "dst" => Ok(Datatype::Dst),
            _ => Err(PlannerError::InvalidValue {
                key: "Datatype",
                value: s.to_string(),
            }),
        }
    }
}

/// Every component of one output LFN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LfnRecord {
    /// Without trailing slash.
    pub basepath: String,
    pub datatype: Datatype,
    pub energy: String,
    pub machine: String,
    pub evt_class: String,
    pub evt_type: String,
    pub detector: Option<String>,
    pub config: Option<String>,
    pub prod_id: TransId,
    pub job_id: JobId,
    pub basename: String,
}

impl LfnRecord {
    /// Output directory up to and including the config directory, with a
    /// trailing slash.
    pub fn output_dir(&self) -> String {
        let mut dir = format!(
            "{}/{}/{}-{}/{}/{}/",
            self.basepath,
            self.datatype.token(),
            self.energy,
            self.machine,
            self.evt_class,
            self.evt_type
        );
        if let Some(detector) = &self.detector {
            dir.push_str(detector);
            dir.push('/');
        }
        if let Some(config) = &self.config {
            dir.push_str(config);
            dir.push('/');
        }
        dir
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}.{}",
            self.basename,
            self.datatype.token(),
            self.prod_id,
            self.job_id,
            self.datatype.extension()
        )
    }

    pub fn build_lfn(&self) -> String {
        format!(
            "{}{}/{}/{}",
            self.output_dir(),
            prod_dir_name(self.prod_id),
            job_dir_name(self.job_id),
            self.file_name()
        )
    }

    /// Split an LFN built by [`build_lfn`](Self::build_lfn) back into its parts.
    pub fn parse_lfn(lfn: &str) -> Result<Self, PlannerError> {
        let bad = || PlannerError::BadLfn(lfn.to_string());

        let mut parts: Vec<&str> = lfn.split('/').collect();
        let file = parts.pop().ok_or_else(bad)?;
        let caps = FILE_NAME.captures(file).ok_or_else(bad)?;
        let datatype: Datatype = caps["dt"].parse().map_err(|_| bad())?;
        if &caps["ext"] != datatype.extension() {
            return Err(bad());
        }
        let prod_id: TransId = caps["prod"].parse().map_err(|_| bad())?;
        let job_id: JobId = caps["job"].parse().map_err(|_| bad())?;

        if parts.pop() != Some(job_dir_name(job_id).as_str())
            || parts.pop() != Some(prod_dir_name(prod_id).as_str())
        {
            return Err(bad());
        }

        let basename = caps["base"].to_string();
        let (detector, config) = if datatype == Datatype::Gen {
            (None, None)
        } else {
            let config = parts.pop().ok_or_else(bad)?.to_string();
            // The detector directory exists exactly when the basename has an `m` segment.
            let detector = match Basename::parse(&basename) {
                Ok(parsed) if parsed.detector.is_none() => None,
                _ => Some(parts.pop().ok_or_else(bad)?.to_string()),
            };
            (detector, Some(config))
        };
        let evt_type = parts.pop().ok_or_else(bad)?.to_string();
        let evt_class = parts.pop().ok_or_else(bad)?.to_string();
        let em = ENERGY_MACHINE.captures(parts.pop().ok_or_else(bad)?).ok_or_else(bad)?;
        if parts.pop() != Some(datatype.token()) {
            return Err(bad());
        }
        let basepath = parts.join("/");
        if !basepath.starts_with('/') {
            return Err(bad());
        }

        Ok(Self {
            basepath,
            datatype,
            energy: em["energy"].to_string(),
            machine: em["machine"].to_string(),
            evt_class,
            evt_type,
            detector,
            config,
            prod_id,
            job_id,
            basename,
        })
    }
}

pub fn prod_dir_name(prod_id: TransId) -> String {
    format!("{prod_id:08}")
}

pub fn job_dir_name(job_id: JobId) -> String {
    format!("{:03}", job_id / 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_record() -> LfnRecord {
        LfnRecord {
            basepath: "/ilc/prod/ilc/mc-opt".into(),
            datatype: Datatype::Sim,
            energy: "500".into(),
            machine: "TDR_ws".into(),
            evt_class: "4f".into(),
            evt_type: "ae_ell".into(),
            detector: Some("ILD_o1_v05".into()),
            config: Some("v01-14-01-p00".into()),
            prod_id: 5012,
            job_id: 12345,
            basename: "sv01-14-01-p00.mILD_o1_v05.E500-TDR_ws.I37538.Pae_ell.eB.pL".into(),
        }
    }

    #[test]
    fn sim_lfn_layout() {
        let lfn = sim_record().build_lfn();
        assert_eq!(
            lfn,
            "/ilc/prod/ilc/mc-opt/sim/500-TDR_ws/4f/ae_ell/ILD_o1_v05/v01-14-01-p00/00005012/012/\
             sv01-14-01-p00.mILD_o1_v05.E500-TDR_ws.I37538.Pae_ell.eB.pL_sim_5012_12345.slcio"
        );
        assert_eq!(LfnRecord::parse_lfn(&lfn).unwrap(), sim_record());
    }

    #[test]
    fn generation_lfn_has_no_detector_dirs() {
        let record = LfnRecord {
            datatype: Datatype::Gen,
            detector: None,
            config: None,
            basename: "E500-TDR_ws.I37538.Pae_ell".into(),
            job_id: 7,
            ..sim_record()
        };
        let lfn = record.build_lfn();
        assert!(lfn.starts_with("/ilc/prod/ilc/mc-opt/gen/500-TDR_ws/4f/ae_ell/00005012/000/"));
        assert!(lfn.ends_with(".stdhep"));
        assert_eq!(LfnRecord::parse_lfn(&lfn).unwrap(), record);
    }

    #[test]
    fn simulation_without_detector_keeps_only_the_config_dir() {
        let record = LfnRecord {
            detector: None,
            basename: "sv01-14-01-p00.E500-TDR_ws.I37538.Pae_ell".into(),
            ..sim_record()
        };
        let lfn = record.build_lfn();
        assert!(lfn.starts_with("/ilc/prod/ilc/mc-opt/sim/500-TDR_ws/4f/ae_ell/v01-14-01-p00/00005012/"));
        assert_eq!(LfnRecord::parse_lfn(&lfn).unwrap(), record);
    }

    #[test]
    fn mismatching_job_dir_is_rejected() {
        let lfn = sim_record().build_lfn().replace("/012/", "/013/");
        assert!(matches!(LfnRecord::parse_lfn(&lfn), Err(PlannerError::BadLfn(_))));
    }

    #[test]
    fn datatype_accepts_metadata_and_token_forms() {
        assert_eq!("SIM".parse::<Datatype>().unwrap(), Datatype::Sim);
        assert_eq!("dst".parse::<Datatype>().unwrap(), Datatype::Dst);
        assert!("raw".parse::<Datatype>().is_err());
    }
}
