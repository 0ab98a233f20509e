use serde::{Deserialize, Serialize};

use super::center::CenterId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub i64);

/// Data entry operator staffing a center.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub name: String,
    pub code: String,
    pub center_id: Option<CenterId>,
    pub post: String,
    pub active: bool,
}
