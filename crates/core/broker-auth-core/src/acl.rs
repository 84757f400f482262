use crate::types::BrokerAuthResult;
use serde::{Deserialize, Serialize};

/// Topic namespace for one-to-one conversations.
pub const PRIVATE_CONVERSATION_TOPIC_PATH: &str = "conversations/private/";

/// Broker ACL document as read by the broker's auth plugin.
///
/// Serialized field names are those of the broker's ACL collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerAcl {
    pub mountpoint: String,
    #[serde(alias = "clientID")]
    pub client_id: String,
    pub username: String,
    pub passhash: String,
    pub publish_acl: Vec<String>,
    pub subscribe_acl: Vec<String>,
}

impl BrokerAcl {
    /// Subscribe rights on the identity's own private topic, publish rights on
    /// every private topic.
    pub fn for_credentials(credentials: &BrokerAuthResult) -> Self {
        Self {
            mountpoint: String::new(),
            client_id: credentials.client_id.clone(),
            username: credentials.username.clone(),
            passhash: credentials.password.clone(),
            publish_acl: vec![format!("{}+", PRIVATE_CONVERSATION_TOPIC_PATH)],
            subscribe_acl: vec![format!(
                "{}{}",
                PRIVATE_CONVERSATION_TOPIC_PATH, credentials.client_id
            )],
        }
    }
}
