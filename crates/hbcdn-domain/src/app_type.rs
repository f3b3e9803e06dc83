use std::fmt;

use serde::{Deserialize, Serialize};

/// Package class derived from the PARAM.SFO `CATEGORY` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    App,
    Game,
    Dlc,
    Update,
    Save,
    Unknown,
}

impl AppType {
    /// Fixed CATEGORY mapping; anything unrecognized lands in `Unknown`.
    #[must_use]
    pub fn from_category(category: &str) -> Self {
        match category.trim().to_ascii_uppercase().as_str() {
            "GD" | "GC" => AppType::Game,
            "GP" => AppType::Update,
            "AC" => AppType::Dlc,
            "SD" => AppType::Save,
            "AD" | "AL" | "AP" | "BD" | "DD" => AppType::App,
            _ => AppType::Unknown,
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "app" => AppType::App,
            "game" => AppType::Game,
            "dlc" => AppType::Dlc,
            "update" => AppType::Update,
            "save" => AppType::Save,
            _ => AppType::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AppType::App => "app",
            AppType::Game => "game",
            AppType::Dlc => "dlc",
            AppType::Update => "update",
            AppType::Save => "save",
            AppType::Unknown => "unknown",
        }
    }

    /// Directory the type is bound to under the PKG root.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            AppType::Unknown => "_unknown",
            other => other.as_str(),
        }
    }

    /// Human-cased name used by the store-db `apptype` column.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            AppType::App => "App",
            AppType::Game => "Game",
            AppType::Dlc => "DLC",
            AppType::Update => "Update",
            AppType::Save => "Save",
            AppType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
