//! Event domain — engine event stream scoped to managed containers.

use futures_util::stream::StreamExt;

use super::client::{DockerClient, DockerError, LABEL_AGENT_ID};

impl DockerClient {
    /// Stream container events for containers carrying the agent label.
    ///
    /// The reconciler uses this to collapse convergence latency from one
    /// polling period down to the event delivery time.
    pub fn stream_agent_events(
        &self,
    ) -> impl futures_util::Stream<Item = Result<bollard::models::EventMessage, DockerError>> + '_
    {
        use bollard::query_parameters::EventsOptionsBuilder;
        use std::collections::HashMap;

        let mut filters = HashMap::new();
        filters.insert("type", vec!["container"]);
        filters.insert("label", vec![LABEL_AGENT_ID]);

        let options = EventsOptionsBuilder::default().filters(&filters).build();

        self.client
            .events(Some(options))
            .map(|r| r.map_err(DockerError::from))
    }
}

/// Extract the agent ID from an engine event, if the actor carries the label.
pub fn event_agent_id(event: &bollard::models::EventMessage) -> Option<String> {
    event
        .actor
        .as_ref()
        .and_then(|actor| actor.attributes.as_ref())
        .and_then(|attrs| attrs.get(LABEL_AGENT_ID))
        .cloned()
}
