//! `GET /kopilot-agent.yaml?token&provider`: renders the agent's Kubernetes
//! deployment manifest. A pure templating function — no external calls —
//! so it is unit-tested directly rather than through the route.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::state::AppState;

const TEMPLATE: &str = r#"apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: kopilot-agent
  namespace: kube-system
spec:
  selector:
    matchLabels:
      app: kopilot-agent
  template:
    metadata:
      labels:
        app: kopilot-agent
    spec:
      hostNetwork: true
      tolerations:
        - effect: NoSchedule
          operator: Exists
      containers:
        - name: agent
          image: {{imageName}}
          args:
            - --connect={{connectURL}}
            - --cert-dir=/etc/kubernetes/pki
          volumeMounts:
            - name: k8s-pki
              mountPath: /etc/kubernetes/pki
              readOnly: true
      volumes:
        - name: k8s-pki
          hostPath:
            path: {{k8sPKIDir}}
"#;

#[derive(Debug, Deserialize)]
pub struct ManifestQuery {
    token: String,
    provider: Option<String>,
}

pub async fn agent_manifest(
    State(state): State<AppState>,
    Query(query): Query<ManifestQuery>,
) -> Response {
    let connect_url = format!(
        "wss://{}/connect?token={}",
        state.config.public_addr, query.token
    );
    let body = render(
        &state.config.agent_image,
        &connect_url,
        query.provider.as_deref(),
    );
    ([(axum::http::header::CONTENT_TYPE, "application/yaml")], body).into_response()
}

fn pki_dir_for(provider: Option<&str>) -> &'static str {
    match provider.map(|p| p.trim().to_lowercase()) {
        Some(p) if p == "minikube" => "/var/lib/minikube/certs",
        _ => "/etc/kubernetes/pki",
    }
}

fn render(image_name: &str, connect_url: &str, provider: Option<&str>) -> String {
    TEMPLATE
        .replace("{{imageName}}", image_name)
        .replace("{{connectURL}}", connect_url)
        .replace("{{k8sPKIDir}}", pki_dir_for(provider))
}
