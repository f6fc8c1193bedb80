use crate::protocol::ServerMessage;
use crate::types::ConnectionId;

/// A message on the shared fan-out channel. Replies to one connection travel
/// the same channel so they stay ordered with everything else.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub message: ServerMessage,
    pub except: Option<ConnectionId>,
    pub only: Option<ConnectionId>,
}

impl Envelope {
    /// Deliver to every connected client
    pub fn to_all(message: ServerMessage) -> Self {
        Self {
            message,
            except: None,
            only: None,
        }
    }

    /// Deliver to every connected client except `sender`
    pub fn to_others(message: ServerMessage, sender: &ConnectionId) -> Self {
        Self {
            message,
            except: Some(sender.clone()),
            only: None,
        }
    }

    /// Deliver to `recipient` alone
    pub fn to_one(message: ServerMessage, recipient: &ConnectionId) -> Self {
        Self {
            message,
            except: None,
            only: Some(recipient.clone()),
        }
    }

    pub fn is_for(&self, connection: &ConnectionId) -> bool {
        self.except.as_ref() != Some(connection)
            && self.only.as_ref().map_or(true, |only| only == connection)
    }
}
