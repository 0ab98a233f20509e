use serde::{Deserialize, Serialize};

use crate::errors::AnalyticsError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub i64);

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broad service category. Stored rows carry free text, which is mapped leniently via
/// [`ServiceType::from_label`]; request input is parsed strictly via `FromStr`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Certificate,
    Scheme,
    Payment,
    Registration,
    General,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::Scheme => "scheme",
            Self::Payment => "payment",
            Self::Registration => "registration",
            Self::General => "general",
        }
    }

    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Self::General)
    }
}

impl std::str::FromStr for ServiceType {
    type Err = AnalyticsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "certificate" | "certification" | "c" => Ok(Self::Certificate),
            "scheme" | "welfare" | "s" => Ok(Self::Scheme),
            "payment" | "bill" | "p" => Ok(Self::Payment),
            "registration" | "application" | "r" => Ok(Self::Registration),
            "general" | "general service" | "" | "g" => Ok(Self::General),
            other => Err(AnalyticsError::InvalidInput(format!(
                "unsupported service type `{other}` \
                 (expected certificate|scheme|payment|registration|general)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub service_type: ServiceType,
    pub department: String,
    pub description: String,
    pub active: bool,
}

impl Service {
    /// Text handed to the embedding provider; empty parts are skipped.
    pub fn embedding_text(&self) -> String {
        embedding_text(&self.name, self.service_type, &self.description)
    }
}

pub fn embedding_text(name: &str, service_type: ServiceType, description: &str) -> String {
    [name.trim(), service_type.as_str(), description.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(". ")
}

#[cfg(test)]
mod tests {
    use super::{embedding_text, ServiceType};

    #[test]
    fn strict_parse_rejects_unknown_types() {
        assert_eq!("Certification".parse::<ServiceType>().ok(), Some(ServiceType::Certificate));
        assert!("telepathy".parse::<ServiceType>().is_err());
    }

    #[test]
    fn lenient_label_falls_back_to_general() {
        assert_eq!(ServiceType::from_label("telepathy"), ServiceType::General);
        assert_eq!(ServiceType::from_label("P"), ServiceType::Payment);
    }

    #[test]
    fn embedding_text_skips_empty_parts() {
        assert_eq!(
            embedding_text("Caste certificate", ServiceType::Certificate, "  "),
            "Caste certificate. certificate"
        );
    }
}
