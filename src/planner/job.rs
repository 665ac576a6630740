// src/planner/job.rs

use std::fmt;

use tracing::{debug, info};

use super::plan::{chain_input, plan_stage, InputMetadata, MetadataPlan, StageSpec};
use super::{Datatype, PlannerError};
use crate::errors::Result;
use crate::host::{FileCatalogClient, Metadata, NewTransformation, TransformationClient};
use crate::transformation::{TransformationBody, WorkflowStep};
use crate::types::{TransId, TransformationType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Draft,
    Checked,
    Created,
    Finalized,
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanState::Draft => "draft",
            PlanState::Checked => "checked",
            PlanState::Created => "created",
            PlanState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// A production being defined: an input query plus an application chain.
///
/// `check` resolves and plans, `create` registers the transformation and
/// `finalize` writes the directory metadata. Editing is only possible before
/// `create`; editing a checked production sends it back to draft.
#[derive(Debug, Clone)]
pub struct ProductionJob {
    name: String,
    basepath: String,
    group: String,
    input_query: Metadata,
    evt_class: Option<String>,
    stages: Vec<StageSpec>,
    state: PlanState,
    plans: Vec<MetadataPlan>,
    prod_id: Option<TransId>,
}

impl ProductionJob {
    pub fn new(name: impl Into<String>, basepath: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            basepath: basepath.into(),
            group: String::new(),
            input_query: Metadata::new(),
            evt_class: None,
            stages: Vec::new(),
            state: PlanState::Draft,
            plans: Vec::new(),
            prod_id: None,
        }
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn plans(&self) -> &[MetadataPlan] {
        &self.plans
    }

    pub fn prod_id(&self) -> Option<TransId> {
        self.prod_id
    }

    fn edit(&mut self, op: &'static str) -> std::result::Result<(), PlannerError> {
        match self.state {
            PlanState::Draft => Ok(()),
            PlanState::Checked => {
                self.state = PlanState::Draft;
                self.plans.clear();
                Ok(())
            }
            state => Err(PlannerError::InvalidState { op, state }),
        }
    }

    pub fn set_input_query(&mut self, query: Metadata) -> std::result::Result<(), PlannerError> {
        self.edit("set the input query of")?;
        self.input_query = query;
        Ok(())
    }

    pub fn set_evt_class(
        &mut self,
        evt_class: impl Into<String>,
    ) -> std::result::Result<(), PlannerError> {
        self.edit("set the event class of")?;
        self.evt_class = Some(evt_class.into());
        Ok(())
    }

    pub fn set_group(&mut self, group: impl Into<String>) -> std::result::Result<(), PlannerError> {
        self.edit("set the group of")?;
        self.group = group.into();
        Ok(())
    }

    pub fn append(&mut self, stage: StageSpec) -> std::result::Result<(), PlannerError> {
        self.edit("append an application to")?;
        self.stages.push(stage);
        Ok(())
    }

    /// Resolve the input query and plan every stage. Nothing is registered.
    pub fn check(&mut self, catalog: &dyn FileCatalogClient) -> Result<&[MetadataPlan]> {
        if matches!(self.state, PlanState::Created | PlanState::Finalized) {
            return Err(PlannerError::InvalidState {
                op: "check",
                state: self.state,
            }
            .into());
        }
        if self.stages.is_empty() {
            return Err(PlannerError::EmptyChain.into());
        }

        let mut input = InputMetadata::resolve(catalog, &self.input_query)?;
        let mut plans = Vec::new();
        for stage in &self.stages {
            plans.extend(plan_stage(
                &input,
                stage,
                &self.basepath,
                self.evt_class.as_deref(),
            )?);
            input = chain_input(&input, stage);
        }

        for plan in &plans {
            debug!(
                application = %plan.application,
                datatype = %plan.datatype,
                dir = %plan.output_dir(),
                basename = %plan.basename,
                "planned stage"
            );
        }
        self.plans = plans;
        self.state = PlanState::Checked;
        Ok(&self.plans)
    }

    pub fn transformation_type(&self) -> TransformationType {
        match self.stages.first().map(|s| s.datatype) {
            Some(Datatype::Gen) | None => TransformationType::McGeneration,
            Some(Datatype::Sim) => TransformationType::McSimulation,
            Some(Datatype::Rec | Datatype::Dst) => TransformationType::McReconstruction,
        }
    }

    fn body(&self) -> TransformationBody {
        let mut steps: Vec<WorkflowStep> = Vec::new();
        for plan in &self.plans {
            match steps.last_mut() {
                // Rec and Dst outputs of one reconstruction stage share a step.
                Some(step)
                    if step.application == plan.application && plan.datatype == Datatype::Dst =>
                {
                    step.output_files.push(plan.output_file.clone());
                }
                _ => steps.push(WorkflowStep {
                    application: plan.application.clone(),
                    datatype: plan.datatype.token().to_string(),
                    output_path: plan.output_dir(),
                    output_files: vec![plan.output_file.clone()],
                }),
            }
        }
        TransformationBody::Workflow { steps }
    }

    /// Register the production as a transformation.
    pub fn create(&mut self, transformations: &dyn TransformationClient) -> Result<TransId> {
        if self.state != PlanState::Checked {
            return Err(PlannerError::InvalidState {
                op: "create",
                state: self.state,
            }
            .into());
        }

        let new = NewTransformation {
            name: self.name.clone(),
            trans_type: self.transformation_type(),
            body: self.body().to_toml()?,
            input_query: self.input_query.clone(),
            group: self.group.clone(),
        };
        let prod_id = transformations.add_transformation(new)?;
        info!(prod_id, name = %self.name, "production created");

        self.prod_id = Some(prod_id);
        self.state = PlanState::Created;
        Ok(prod_id)
    }

    /// Create the output directories and write their metadata claims.
    pub fn finalize(&mut self, catalog: &dyn FileCatalogClient) -> Result<()> {
        let prod_id = match (self.state, self.prod_id) {
            (PlanState::Created, Some(id)) => id,
            (state, _) => {
                return Err(PlannerError::InvalidState {
                    op: "finalize",
                    state,
                }
                .into());
            }
        };

        for plan in &self.plans {
            for (dir, meta) in plan.claims(prod_id) {
                catalog.create_directory(&dir)?;
                catalog.set_metadata(&dir, &meta)?;
            }
        }
        info!(prod_id, dirs = self.plans.len(), "production metadata registered");

        self.state = PlanState::Finalized;
        Ok(())
    }
}
