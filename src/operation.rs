use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LockError, LockResult};
use crate::tree::{NodeId, UserId};

/// The mutating operations a client may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Lock,
    Unlock,
    Upgrade,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Lock, Operation::Unlock, Operation::Upgrade];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Lock => "lock",
            Operation::Unlock => "unlock",
            Operation::Upgrade => "upgrade",
        }
    }

    /// Numeric code used by the batch query format
    pub fn code(&self) -> u8 {
        match self {
            Operation::Lock => 1,
            Operation::Unlock => 2,
            Operation::Upgrade => 3,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = anyhow::Error;

    /// Accepts `lock`/`unlock`/`upgrade` (any case) or the codes `1`/`2`/`3`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lock" | "1" => Ok(Operation::Lock),
            "unlock" | "2" => Ok(Operation::Unlock),
            "upgrade" | "3" => Ok(Operation::Upgrade),
            other => Err(anyhow::anyhow!(
                "Invalid operation '{}'. Use: lock|unlock|upgrade or 1|2|3",
                other
            )),
        }
    }
}

/// Body of a lock, unlock or upgrade call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    pub node: NodeId,
    pub uid: UserId,
}

impl LockRequest {
    pub fn new(node: impl Into<NodeId>, uid: UserId) -> Self {
        LockRequest { node: node.into(), uid }
    }
}

/// Outcome of a lock, unlock or upgrade call.
///
/// `success` is the minimal contract; `error` carries the reason code of a
/// rejection and is omitted on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&LockResult<()>> for LockResponse {
    fn from(result: &LockResult<()>) -> Self {
        match result {
            Ok(()) => LockResponse { success: true, error: None },
            Err(e) => LockResponse {
                success: false,
                error: Some(e.code().to_string()),
            },
        }
    }
}

impl From<LockResult<()>> for LockResponse {
    fn from(result: LockResult<()>) -> Self {
        LockResponse::from(&result)
    }
}

impl LockResponse {
    /// Whether this response carries the reason code of `err`
    pub fn is_rejected_with(&self, err: &LockError) -> bool {
        self.error.as_deref() == Some(err.code())
    }
}

/// One line of the request stream: a mutation or a tree query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request {
    Lock { node: NodeId, uid: UserId },
    Unlock { node: NodeId, uid: UserId },
    Upgrade { node: NodeId, uid: UserId },
    Tree,
}

impl Request {
    /// Split a mutating request into its operation and body
    pub fn into_mutation(self) -> Option<(Operation, LockRequest)> {
        match self {
            Request::Lock { node, uid } => Some((Operation::Lock, LockRequest { node, uid })),
            Request::Unlock { node, uid } => Some((Operation::Unlock, LockRequest { node, uid })),
            Request::Upgrade { node, uid } => Some((Operation::Upgrade, LockRequest { node, uid })),
            Request::Tree => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operation() {
        assert_eq!("lock".parse::<Operation>().unwrap(), Operation::Lock);
        assert_eq!("UPGRADE".parse::<Operation>().unwrap(), Operation::Upgrade);
        assert_eq!("2".parse::<Operation>().unwrap(), Operation::Unlock);
        assert!("4".parse::<Operation>().is_err());
        assert!("steal".parse::<Operation>().is_err());
    }

    #[test]
    fn test_codes_round_trip() {
        for op in Operation::ALL {
            assert_eq!(op.code().to_string().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn test_response_shape() {
        let ok = LockResponse::from(Ok(()));
        assert_eq!(serde_json::to_string(&ok).unwrap(), r#"{"success":true}"#);

        let rejected = LockResponse::from(Err(LockError::MixedOwnership));
        assert_eq!(
            serde_json::to_string(&rejected).unwrap(),
            r#"{"success":false,"error":"mixed_ownership"}"#
        );
        assert!(rejected.is_rejected_with(&LockError::MixedOwnership));
    }

    #[test]
    fn test_request_stream_line() {
        let req: Request = serde_json::from_str(r#"{"op":"upgrade","node":"Asia","uid":3}"#).unwrap();
        let (op, body) = req.into_mutation().unwrap();
        assert_eq!(op, Operation::Upgrade);
        assert_eq!(body, LockRequest::new("Asia", 3));

        let req: Request = serde_json::from_str(r#"{"op":"tree"}"#).unwrap();
        assert_eq!(req, Request::Tree);
        assert!(serde_json::from_str::<Request>(r#"{"op":"steal","node":"x","uid":1}"#).is_err());
    }
}
