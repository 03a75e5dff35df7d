use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Upload,
    Download,
}

/// Single letter code printed for every planned action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionCode {
    New,
    Updated,
    Forced,
    Reverted,
    KeptConflicting,
    Deleted,
    KeptDeleted,
    Unchanged,
}

impl ActionCode {
    pub fn as_char(&self) -> char {
        match self {
            ActionCode::New => 'N',
            ActionCode::Updated => 'U',
            ActionCode::Forced => 'F',
            ActionCode::Reverted => 'R',
            ActionCode::KeptConflicting => 'r',
            ActionCode::Deleted => 'D',
            ActionCode::KeptDeleted => 'd',
            ActionCode::Unchanged => '-',
        }
    }

    /// Lowest report level at which the action is printed.
    pub fn min_report_level(&self) -> u8 {
        match self {
            ActionCode::New
            | ActionCode::Updated
            | ActionCode::Forced
            | ActionCode::Reverted
            | ActionCode::Deleted => 1,
            ActionCode::KeptConflicting | ActionCode::KeptDeleted => 2,
            ActionCode::Unchanged => 3,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            ActionCode::New | ActionCode::Updated | ActionCode::Forced | ActionCode::Reverted
        )
    }

    pub fn is_delete(&self) -> bool {
        *self == ActionCode::Deleted
    }

    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            ActionCode::KeptConflicting | ActionCode::KeptDeleted | ActionCode::Unchanged
        )
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub code: ActionCode,
    /// Relative path, `/`-delimited, directories with a trailing `/`.
    pub path: String,
    pub is_directory: bool,
}

impl PlannedAction {
    pub fn report_line(&self) -> String {
        format!("{} {}", self.code, self.path)
    }
}
