// Cluster Membership - which instances the master reports as connected
//
// Replaced wholesale on every successful poll, never merged.

/// Connected instance identifiers as last reported by the master
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterMembership {
    /// Our own client identifier, once known
    my_id: Option<String>,
    /// Identifiers in the order the master reported them
    clients: Vec<String>,
}

impl ClusterMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record our own identifier so `others()` can skip it
    pub fn set_self(&mut self, client_identifier: &str) {
        self.my_id = Some(client_identifier.to_string());
    }

    /// Our own identifier, if assigned
    pub fn my_id(&self) -> Option<&str> {
        self.my_id.as_deref()
    }

    /// Replace the whole view
    pub fn replace(&mut self, clients: Vec<String>) {
        self.clients = clients;
    }

    /// Forget the view and our identity
    pub fn reset(&mut self) {
        self.my_id = None;
        self.clients.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn contains(&self, client_identifier: &str) -> bool {
        self.clients.iter().any(|c| c == client_identifier)
    }

    /// Every connected instance
    pub fn all(&self) -> &[String] {
        &self.clients
    }

    /// Every connected instance except ourselves
    pub fn others(&self) -> Vec<String> {
        self.clients
            .iter()
            .filter(|c| Some(c.as_str()) != self.my_id.as_deref())
            .cloned()
            .collect()
    }
}
