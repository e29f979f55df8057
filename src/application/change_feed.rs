use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::medication::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedTable {
    Medications,
    Logs,
}

impl ChangedTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangedTable::Medications => "medications",
            ChangedTable::Logs => "medication_logs",
        }
    }
}

/// "Something changed, reload." Carries no row data on purpose: receivers
/// rebuild their whole view from a fresh snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeSignal {
    pub user_id: UserId,
    pub table: ChangedTable,
}

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeSignal>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, user_id: UserId, table: ChangedTable) {
        // No subscribers is fine.
        let receivers = self.sender.send(ChangeSignal { user_id, table }).unwrap_or(0);
        tracing::debug!(user_id = %user_id.0, table = table.as_str(), receivers, "change published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSignal> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self { Self::new(64) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_signals() {
        let feed = ChangeFeed::new(4);
        let mut rx = feed.subscribe();
        let user = UserId::default();
        feed.publish(user, ChangedTable::Logs);
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal, ChangeSignal { user_id: user, table: ChangedTable::Logs });
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        ChangeFeed::default().publish(UserId::default(), ChangedTable::Medications);
    }
}
