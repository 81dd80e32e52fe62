//! Hub process configuration: CLI flags with environment-variable
//! fallbacks, matching the external interface table this binary exposes.

use clap::Parser;

/// Runs the reverse-tunnel hub: the agent connect endpoint, the public
/// proxy, and (when peer flags are set) the peer-to-peer failover listener.
#[derive(Debug, Parser, Clone)]
#[command(name = "relay-hub", version, about)]
pub struct HubConfig {
    /// Address the public listener binds to.
    #[arg(long, env = "RELAY_BIND", default_value = "0.0.0.0:6188")]
    pub bind: String,

    /// Externally reachable address of this hub, used to build the agent's
    /// `wss://` connect URL and the agent manifest template.
    #[arg(long, env = "RELAY_PUBLIC_ADDR")]
    pub public_addr: String,

    /// Container image reference rendered into the agent manifest.
    #[arg(long, env = "RELAY_AGENT_IMAGE")]
    pub agent_image: String,

    /// This replica's own address, excluded from its own peer list.
    #[arg(long, env = "RELAY_IP")]
    pub ip: String,

    /// Address the mTLS peer listener binds to. Omit to disable peer
    /// failover entirely (single-replica deployments).
    #[arg(long, env = "RELAY_PEER_BIND")]
    pub peer_bind: Option<String>,

    /// Directory holding `tls.crt`, `tls.key`, `ca.crt` for the peer mesh.
    #[arg(long, env = "RELAY_PEER_CERT_DIR")]
    pub peer_cert_dir: Option<String>,

    /// Namespace of the Kubernetes Service whose Endpoints enumerate peers.
    #[arg(long, env = "RELAY_SERVICE_NAMESPACE")]
    pub service_namespace: Option<String>,

    /// Name of the Kubernetes Service whose Endpoints enumerate peers.
    #[arg(long, env = "RELAY_SERVICE_NAME")]
    pub service_name: Option<String>,

    /// Verify the peer's TLS server certificate against the peer CA rather
    /// than skipping verification (mutual auth still happens via the client
    /// certificate either way). Off by default, matching the deployments
    /// this hub is modeled on.
    #[arg(long, env = "RELAY_PEER_VERIFY_SERVER_CERT", default_value_t = false)]
    pub peer_verify_server_cert: bool,
}

impl HubConfig {
    /// Whether this replica is configured to take part in peer failover.
    pub fn peer_mesh_enabled(&self) -> bool {
        self.peer_bind.is_some() && self.peer_cert_dir.is_some()
    }
}
