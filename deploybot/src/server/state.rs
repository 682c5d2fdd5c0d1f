//! Server state

use std::sync::Arc;

use secrecy::SecretString;

use crate::chat::outbox::Outbox;
use crate::chat::router::Dispatcher;
use crate::control::service::ControlService;
use crate::store::records::DeploymentStore;

/// Server state shared across handlers
pub struct ServerState {
    pub dispatcher: Arc<Dispatcher>,
    pub outbox: Arc<Outbox>,
    pub control: Arc<ControlService>,
    pub store: Arc<DeploymentStore>,
    /// Bearer token required on the transport endpoints, if set
    pub transport_token: Option<SecretString>,
}

impl ServerState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        outbox: Arc<Outbox>,
        control: Arc<ControlService>,
        store: Arc<DeploymentStore>,
    ) -> Self {
        Self {
            dispatcher,
            outbox,
            control,
            store,
            transport_token: None,
        }
    }

    pub fn with_transport_token(mut self, token: SecretString) -> Self {
        self.transport_token = Some(token);
        self
    }
}
