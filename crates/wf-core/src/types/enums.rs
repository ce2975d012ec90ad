use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use utoipa::openapi::schema::{ObjectBuilder, Schema, Type};
use utoipa::openapi::RefOr;
use utoipa::ToSchema;

/// Number of build phases a server-mode job runs through.
pub const PHASE_COUNT: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Reviewing,
    Fixing,
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    NeedsFix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Status tag of a durable build job.
///
/// Serialized as the flat strings the worker protocol uses: `planning`,
/// `building_phase_{1..4}`, `completed`, `failed_phase_{N}`, `failed_timeout`, `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Planning,
    Building(u8),
    Completed,
    FailedPhase(u8),
    FailedTimeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusParseError {
    pub value: String,
}

impl fmt::Display for JobStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job status: {}", self.value)
    }
}

impl std::error::Error for JobStatusParseError {}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::FailedPhase(_) | Self::FailedTimeout | Self::Cancelled
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::FailedPhase(_) | Self::FailedTimeout)
    }

    /// Phase number carried by the status tag, if any.
    pub fn phase(self) -> Option<u8> {
        match self {
            Self::Building(phase) | Self::FailedPhase(phase) => Some(phase),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Building(phase) => write!(f, "building_phase_{phase}"),
            Self::Completed => write!(f, "completed"),
            Self::FailedPhase(phase) => write!(f, "failed_phase_{phase}"),
            Self::FailedTimeout => write!(f, "failed_timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || JobStatusParseError {
            value: s.to_string(),
        };
        let parse_phase = |rest: &str| -> Result<u8, JobStatusParseError> {
            let phase = rest.parse::<u8>().map_err(|_| err())?;
            if (1..=PHASE_COUNT).contains(&phase) {
                Ok(phase)
            } else {
                Err(err())
            }
        };
        match s {
            "planning" => Ok(Self::Planning),
            "completed" => Ok(Self::Completed),
            "failed_timeout" => Ok(Self::FailedTimeout),
            "cancelled" => Ok(Self::Cancelled),
            _ => {
                if let Some(rest) = s.strip_prefix("building_phase_") {
                    return parse_phase(rest).map(Self::Building);
                }
                if let Some(rest) = s.strip_prefix("failed_phase_") {
                    return parse_phase(rest).map(Self::FailedPhase);
                }
                Err(err())
            }
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

impl utoipa::PartialSchema for JobStatus {
    fn schema() -> RefOr<Schema> {
        RefOr::T(Schema::Object(
            ObjectBuilder::new()
                .schema_type(Type::String)
                .description(Some(
                    "planning | building_phase_N | completed | failed_phase_N | failed_timeout | cancelled",
                ))
                .build(),
        ))
    }
}

impl ToSchema for JobStatus {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tags_round_trip() {
        for status in [
            JobStatus::Planning,
            JobStatus::Building(1),
            JobStatus::Building(4),
            JobStatus::Completed,
            JobStatus::FailedPhase(2),
            JobStatus::FailedTimeout,
            JobStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn phase_is_parsed_out_of_tag() {
        let status: JobStatus = "building_phase_3".parse().unwrap();
        assert_eq!(status.phase(), Some(3));
        assert_eq!(JobStatus::Completed.phase(), None);
    }

    #[test]
    fn out_of_range_phases_are_rejected() {
        assert!("building_phase_0".parse::<JobStatus>().is_err());
        assert!("building_phase_5".parse::<JobStatus>().is_err());
        assert!("failed_phase_x".parse::<JobStatus>().is_err());
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Planning.is_terminal());
        assert!(!JobStatus::Building(2).is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::FailedPhase(1).is_terminal());
        assert!(JobStatus::FailedTimeout.is_failed());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Cancelled.is_failed());
    }

    #[test]
    fn serde_uses_flat_strings() {
        let json = serde_json::to_string(&JobStatus::Building(2)).unwrap();
        assert_eq!(json, "\"building_phase_2\"");
        let status: JobStatus = serde_json::from_str("\"failed_timeout\"").unwrap();
        assert_eq!(status, JobStatus::FailedTimeout);
    }
}
