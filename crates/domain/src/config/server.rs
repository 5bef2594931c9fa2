use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address the forwarding front end listens on for client queries.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Capacity of the per-query answer buffer handed to upstream transports.
    #[serde(default = "default_answer_buffer_size")]
    pub answer_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            answer_buffer_size: default_answer_buffer_size(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:5353".to_string()
}

fn default_answer_buffer_size() -> usize {
    4096
}
