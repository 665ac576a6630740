// src/planner/basename.rs

//! Canonical production basename.
//!
//! Segments, in this order, joined by `.`:
//!
//! ```text
//! [r{recoConfig}] [s{simConfig}] [m{detector}] E{energy}-{machine} I{processID} P{process} [e{pol1}] [p{pol2}]
//! ```
//!
//! Values may not be empty and may not contain `.` or `/`.

use std::fmt;

use super::PlannerError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Basename {
    pub reco_config: Option<String>,
    pub sim_config: Option<String>,
    pub detector: Option<String>,
    pub energy: String,
    pub machine: String,
    pub process_id: String,
    pub process: String,
    pub pol1: Option<String>,
    pub pol2: Option<String>,
}

fn check(key: &'static str, value: &str) -> Result<(), PlannerError> {
    if value.is_empty() || value.contains('.') || value.contains('/') {
        return Err(PlannerError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl Basename {
    pub fn validate(&self) -> Result<(), PlannerError> {
        let optional = [
            ("recoConfig", &self.reco_config),
            ("ILDConfig", &self.sim_config),
            ("DetectorModel", &self.detector),
            ("PolarizationB1", &self.pol1),
            ("PolarizationB2", &self.pol2),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                check(key, v)?;
            }
        }
        check("Energy", &self.energy)?;
        if !self.energy.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PlannerError::InvalidEnergy(self.energy.clone()));
        }
        check("MachineParams", &self.machine)?;
        check("ProcessID", &self.process_id)?;
        check("EvtType", &self.process)?;
        Ok(())
    }

    /// Inverse of `Display`.
    pub fn parse(text: &str) -> Result<Self, PlannerError> {
        let bad = || PlannerError::BadBasename(text.to_string());
        let mut segments = text.split('.').peekable();
        let mut out = Basename::default();

        let mut take = |prefix: char| -> Option<String> {
            let seg = segments.next_if(|s| s.starts_with(prefix))?;
            Some(seg[prefix.len_utf8()..].to_string())
        };

        out.reco_config = take('r');
        out.sim_config = take('s');
        out.detector = take('m');
        let em = take('E').ok_or_else(bad)?;
        let (energy, machine) = em.split_once('-').ok_or_else(bad)?;
        out.energy = energy.to_string();
        out.machine = machine.to_string();
        out.process_id = take('I').ok_or_else(bad)?;
        out.process = take('P').ok_or_else(bad)?;
        out.pol1 = take('e');
        out.pol2 = take('p');

        if segments.next().is_some() {
            return Err(bad());
        }
        out.validate().map_err(|_| bad())?;
        Ok(out)
    }
}

impl fmt::Display for Basename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments = Vec::with_capacity(8);
        if let Some(r) = &self.reco_config {
            segments.push(format!("r{r}"));
        }
        if let Some(s) = &self.sim_config {
            segments.push(format!("s{s}"));
        }
        if let Some(m) = &self.detector {
            segments.push(format!("m{m}"));
        }
        segments.push(format!("E{}-{}", self.energy, self.machine));
        segments.push(format!("I{}", self.process_id));
        segments.push(format!("P{}", self.process));
        if let Some(e) = &self.pol1 {
            segments.push(format!("e{e}"));
        }
        if let Some(p) = &self.pol2 {
            segments.push(format!("p{p}"));
        }
        f.write_str(&segments.join("."))
    }
}
