//! alert_messages and alert_deliveries trees

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{put, scan_since, time_key, StorageError, Store};
use crate::types::{AlertDelivery, AlertMessage};

impl Store {
    pub fn save_alert(&self, alert: &AlertMessage) -> Result<(), StorageError> {
        put(&self.alert_messages, time_key(alert.timestamp, alert.id), alert)
    }

    pub fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertMessage>, StorageError> {
        scan_since(&self.alert_messages, since)
    }

    /// Deliveries are keyed by alert id then channel.
    pub fn save_delivery(&self, delivery: &AlertDelivery) -> Result<(), StorageError> {
        let mut key = delivery.alert_id.as_bytes().to_vec();
        key.extend_from_slice(delivery.channel.as_str().as_bytes());
        put(&self.alert_deliveries, key, delivery)
    }

    pub fn deliveries_for(&self, alert_id: Uuid) -> Result<Vec<AlertDelivery>, StorageError> {
        self.alert_deliveries
            .scan_prefix(alert_id.as_bytes())
            .map(|item| {
                let (k, v) = item?;
                super::decode(&self.alert_deliveries, &k, &v)
            })
            .collect()
    }
}
