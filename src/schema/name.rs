//! Module-qualified schema names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separator between the module and the local part of a name.
pub const NAME_SEPARATOR: &str = "::";

/// Canonical reference to a schema entity: `module::name`.
///
/// Module objects themselves use an empty local part and render as the
/// bare module name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualName {
    pub module: String,
    pub name: String,
}

impl QualName {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Name referring to a module as a whole.
    pub fn module(module: impl Into<String>) -> Self {
        Self::new(module, "")
    }

    pub fn is_module(&self) -> bool {
        self.name.is_empty()
    }

    /// Local part of the name, without the module.
    pub fn local(&self) -> &str {
        &self.name
    }

    /// Name of a specialization of this generic pointer on `source`.
    ///
    /// `app::name` specialized on `app::Person` becomes `app::name@Person`.
    pub fn specialized_on(&self, source: &QualName) -> QualName {
        QualName::new(
            source.module.clone(),
            format!("{}@{}", self.name, source.name),
        )
    }

    /// Local part with any specialization suffix removed.
    pub fn base_local(&self) -> &str {
        self.name.split('@').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for QualName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_module() {
            write!(f, "{}", self.module)
        } else {
            write!(f, "{}{}{}", self.module, NAME_SEPARATOR, self.name)
        }
    }
}

impl FromStr for QualName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(NAME_SEPARATOR) {
            Some((module, name)) if !module.is_empty() && !name.is_empty() => {
                Ok(QualName::new(module, name))
            }
            Some(_) => Err(format!("invalid qualified name '{}'", s)),
            None if !s.is_empty() => Ok(QualName::module(s)),
            None => Err("empty name".to_string()),
        }
    }
}

impl Serialize for QualName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QualName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Shorthand used throughout tests and builtin tables.
pub fn qn(s: &str) -> QualName {
    s.parse()
        .unwrap_or_else(|_| QualName::module(s.to_string()))
}
