use serde::Serialize;
use crate::metadata::postgres::FromPgChar;
use crate::TablescopeError;

#[derive(Debug, Eq, PartialEq, Copy, Clone, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineKind {
    #[default]
    Function,
    Procedure,
    Aggregate,
    Window,
}

impl FromPgChar for RoutineKind {
    fn from_pg_char(c: char) -> Result<Self, TablescopeError> {
        match c {
            'f' => Ok(RoutineKind::Function),
            'p' => Ok(RoutineKind::Procedure),
            'a' => Ok(RoutineKind::Aggregate),
            'w' => Ok(RoutineKind::Window),
            _ => Err(TablescopeError::UnknownRoutineKind(c.to_string())),
        }
    }
}

/// A stored function or procedure.
#[derive(Debug, Eq, PartialEq, Clone, Serialize)]
pub struct Routine {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub kind: RoutineKind,
    pub return_type: Option<String>,
    pub language: Option<String>,
    pub definition: Option<String>,
    pub remarks: Option<String>,
}
