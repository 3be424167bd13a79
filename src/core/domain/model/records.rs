//! Domain models for historical load and ping records.

use serde::{Deserialize, Serialize};

/// Which history a records query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Load,
    Ping,
}

impl RecordKind {
    pub(crate) fn method(self) -> &'static str {
        match self {
            RecordKind::Load => "records.getLoadRecords",
            RecordKind::Ping => "records.getPingRecords",
        }
    }
}

/// Filter parameters for a records query.
///
/// Serialized as the params object of the RPC call; unset filters are
/// omitted so that the backend applies its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordsQuery {
    pub uuid: String,
    /// Time window in hours, counting back from now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<u32>,
    /// Restricts load records to a single metric (e.g. `cpu`, `ram`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_type: Option<String>,
    /// Upper bound on the number of points returned.
    #[serde(rename = "maxCount", skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
}

impl RecordsQuery {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            hours: None,
            load_type: None,
            max_count: None,
        }
    }

    pub fn hours(mut self, hours: u32) -> Self {
        self.hours = Some(hours);
        self
    }

    pub fn load_type(mut self, load_type: impl Into<String>) -> Self {
        self.load_type = Some(load_type.into());
        self
    }

    pub fn max_count(mut self, max_count: u32) -> Self {
        self.max_count = Some(max_count);
        self
    }
}

/// A historical load sample.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusRecord {
    pub client: String,
    pub time: String,
    pub cpu: f64,
    pub gpu: f64,
    pub ram: u64,
    pub ram_total: u64,
    pub swap: u64,
    pub swap_total: u64,
    pub load: f64,
    pub load5: f64,
    pub load15: f64,
    pub temp: f64,
    pub disk: u64,
    pub disk_total: u64,
    pub net_in: u64,
    pub net_out: u64,
    pub net_total_up: u64,
    pub net_total_down: u64,
    pub process: u64,
    pub connections: u64,
    pub connections_udp: u64,
}

/// A single ping measurement of a ping task.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PingRecord {
    pub client: String,
    pub task_id: i64,
    pub time: String,
    /// Round trip time in milliseconds, negative when the ping was lost.
    pub value: f64,
}

/// A ping task configured on the backend.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PingTask {
    pub id: i64,
    pub name: String,
    /// Ping interval in seconds.
    pub interval: u64,
    /// Loss percentage over the window.
    pub loss: f64,
}

/// Response of a records query.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecordsResponse<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    /// Only present for ping records.
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<PingTask>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_omits_unset_filters() {
        let query = RecordsQuery::new("a1").hours(4);
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            serde_json::json!({"uuid": "a1", "hours": 4})
        );

        let query = RecordsQuery::new("a1").load_type("cpu").max_count(100);
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            serde_json::json!({"uuid": "a1", "load_type": "cpu", "maxCount": 100})
        );
    }

    #[test]
    fn test_ping_records_response_with_tasks() {
        let response: RecordsResponse<PingRecord> = serde_json::from_value(serde_json::json!({
            "count": 1,
            "records": [{"client": "a1", "task_id": 7, "time": "t", "value": 31.5}],
            "tasks": [{"id": 7, "name": "cf", "interval": 60, "loss": 0.0}]
        }))
        .unwrap();

        assert_eq!(response.records[0].task_id, 7);
        assert_eq!(response.tasks[0].name, "cf");
    }
}
