use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Where a method is allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    /// Any pool thread, immediately
    Worker,
    /// Marshaled onto the host's serial main loop
    Main,
}

/// The fixed method catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Ping,
    ProjectInfo,
    ProjectRefresh,
    ScriptRead,
    ScriptCreate,
    ScriptDelete,
    ScriptApplyDiff,
    FolderList,
    FolderCreate,
    FolderRename,
    FolderMove,
    FolderDelete,
    DiagnosticsGet,
    BatchStart,
    BatchEnd,
}

impl Method {
    pub const ALL: [Method; 15] = [
        Method::Ping,
        Method::ProjectInfo,
        Method::ProjectRefresh,
        Method::ScriptRead,
        Method::ScriptCreate,
        Method::ScriptDelete,
        Method::ScriptApplyDiff,
        Method::FolderList,
        Method::FolderCreate,
        Method::FolderRename,
        Method::FolderMove,
        Method::FolderDelete,
        Method::DiagnosticsGet,
        Method::BatchStart,
        Method::BatchEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Ping => "ping",
            Method::ProjectInfo => "project/info",
            Method::ProjectRefresh => "project/refresh",
            Method::ScriptRead => "script/read",
            Method::ScriptCreate => "script/create",
            Method::ScriptDelete => "script/delete",
            Method::ScriptApplyDiff => "script/applyDiff",
            Method::FolderList => "folder/list",
            Method::FolderCreate => "folder/create",
            Method::FolderRename => "folder/rename",
            Method::FolderMove => "folder/move",
            Method::FolderDelete => "folder/delete",
            Method::DiagnosticsGet => "diagnostics/get",
            Method::BatchStart => "batch/start",
            Method::BatchEnd => "batch/end",
        }
    }

    /// Static thread affinity. Anything that mutates project state runs on
    /// the main loop.
    pub fn affinity(&self) -> Affinity {
        match self {
            Method::ScriptCreate
            | Method::ScriptDelete
            | Method::ScriptApplyDiff
            | Method::FolderCreate
            | Method::FolderRename
            | Method::FolderMove
            | Method::FolderDelete => Affinity::Main,
            Method::Ping
            | Method::ProjectInfo
            | Method::ProjectRefresh
            | Method::ScriptRead
            | Method::FolderList
            | Method::DiagnosticsGet
            | Method::BatchStart
            | Method::BatchEnd => Affinity::Worker,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Affinity for a raw method name; unknown names are treated as main-affine
/// so clients wait the longer deadline.
pub fn affinity_of(method: &str) -> Affinity {
    method
        .parse::<Method>()
        .map(|m| m.affinity())
        .unwrap_or(Affinity::Main)
}
