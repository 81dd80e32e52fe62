//! Agent process configuration. The two credential modes are mutually
//! exclusive: either the pod's mounted service-account token (`--apiserver`)
//! or a front-proxy client certificate directory (`--cert-dir`), never both.

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "relay-agent", version, about)]
pub struct AgentConfig {
    /// `wss://` URL of the hub's connect endpoint, including the bearer token.
    #[arg(long, env = "RELAY_CONNECT")]
    pub connect: String,

    /// Local apiserver host:port, for service-account bearer-token mode.
    #[arg(long, env = "RELAY_APISERVER")]
    pub apiserver: Option<String>,

    /// Directory holding `front-proxy-client.crt`, `front-proxy-client.key`,
    /// and `ca.crt`, for front-proxy mTLS mode.
    #[arg(long, env = "RELAY_CERT_DIR")]
    pub cert_dir: Option<String>,

    /// Skip TLS certificate verification when dialing the hub. Matches the
    /// deployments this agent is modeled on; flip off for a hardened setup
    /// with a trusted hub CA.
    #[arg(long, env = "RELAY_INSECURE_SKIP_VERIFY", default_value_t = true)]
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone)]
pub enum ApiserverAuthMode {
    ServiceAccount {
        token_path: String,
        ca_path: String,
    },
    FrontProxy {
        cert_dir: String,
    },
}

impl AgentConfig {
    pub fn auth_mode(&self) -> anyhow::Result<ApiserverAuthMode> {
        match (&self.apiserver, &self.cert_dir) {
            (Some(_), Some(_)) => Err(anyhow::anyhow!(
                "--apiserver and --cert-dir are mutually exclusive"
            )),
            (None, None) => Err(anyhow::anyhow!(
                "one of --apiserver or --cert-dir is required"
            )),
            (Some(_), None) => Ok(ApiserverAuthMode::ServiceAccount {
                token_path: "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string(),
                ca_path: "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt".to_string(),
            }),
            (None, Some(dir)) => Ok(ApiserverAuthMode::FrontProxy {
                cert_dir: dir.clone(),
            }),
        }
    }

    /// The local apiserver address, checked rather than assumed: only set
    /// when `auth_mode` resolved to service-account mode.
    pub fn apiserver_addr(&self) -> anyhow::Result<&str> {
        self.apiserver
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--apiserver is only set in service-account mode"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(connect: &str) -> AgentConfig {
        AgentConfig {
            connect: connect.to_string(),
            apiserver: None,
            cert_dir: None,
            insecure_skip_verify: true,
        }
    }

    #[test]
    fn rejects_both_modes_set() {
        let mut cfg = base("wss://hub/connect?token=t");
        cfg.apiserver = Some("10.0.0.1:6443".into());
        cfg.cert_dir = Some("/pki".into());
        assert!(cfg.auth_mode().is_err());
    }

    #[test]
    fn rejects_neither_mode_set() {
        let cfg = base("wss://hub/connect?token=t");
        assert!(cfg.auth_mode().is_err());
    }

    #[test]
    fn service_account_mode_selected() {
        let mut cfg = base("wss://hub/connect?token=t");
        cfg.apiserver = Some("10.0.0.1:6443".into());
        assert!(matches!(
            cfg.auth_mode().unwrap(),
            ApiserverAuthMode::ServiceAccount { .. }
        ));
    }

    #[test]
    fn front_proxy_mode_selected() {
        let mut cfg = base("wss://hub/connect?token=t");
        cfg.cert_dir = Some("/pki".into());
        assert!(matches!(
            cfg.auth_mode().unwrap(),
            ApiserverAuthMode::FrontProxy { .. }
        ));
    }
}
