use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use serde::Serialize;
use crate::{Result, TablescopeError};

/// The extraction phases, in the order they run.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Tables,
    Columns,
    Indexes,
    PrimaryKeys,
    ForeignKeys,
    Views,
    Routines,
    Resolved,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::Init,
        Stage::Tables,
        Stage::Columns,
        Stage::Indexes,
        Stage::PrimaryKeys,
        Stage::ForeignKeys,
        Stage::Views,
        Stage::Routines,
        Stage::Resolved,
    ];

    /// Every stage that must have completed before this one may begin.
    pub fn prerequisites(&self) -> &'static [Stage] {
        let position = Stage::ALL.iter().position(|s| s == self).unwrap_or(0);
        &Stage::ALL[..position]
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Init => "init",
            Stage::Tables => "tables",
            Stage::Columns => "columns",
            Stage::Indexes => "indexes",
            Stage::PrimaryKeys => "primary keys",
            Stage::ForeignKeys => "foreign keys",
            Stage::Views => "views",
            Stage::Routines => "routines",
            Stage::Resolved => "resolved",
        })
    }
}

/// Enforces that stages run once each, in order.
#[derive(Debug, Default)]
pub struct StageTracker {
    started: HashSet<Stage>,
    completed: HashSet<Stage>,
    current: Option<Stage>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, stage: Stage) -> Result {
        if self.started.contains(&stage) {
            return Err(TablescopeError::StageRepeated { stage });
        }

        if let Some(missing) = stage.prerequisites().iter().find(|s| !self.completed.contains(s)) {
            return Err(TablescopeError::StageOrder {
                stage,
                missing: *missing,
            });
        }

        self.started.insert(stage);
        self.current = Some(stage);
        Ok(())
    }

    pub fn complete(&mut self, stage: Stage) -> Result {
        if !self.started.contains(&stage) {
            return Err(TablescopeError::StageOrder {
                stage,
                missing: stage,
            });
        }

        self.completed.insert(stage);
        Ok(())
    }

    /// Marks a stage that is turned off in the configuration as done.
    pub fn skip(&mut self, stage: Stage) -> Result {
        self.begin(stage)?;
        self.complete(stage)
    }

    /// The stage that was started last.
    pub fn current(&self) -> Stage {
        self.current.unwrap_or(Stage::Init)
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }
}
