//! Service definition derived from a deployment record

use crate::http::provider::{EnvVar, ServiceSpec, PYTHON_VERSION, TOKEN_ENV};
use crate::intake::validate::ENTRY_POINTS;
use crate::models::deployment::Deployment;

/// Hosting parameters shared by every service
#[derive(Debug, Clone)]
pub struct HostingOptions {
    pub service_type: String,
    pub runtime: String,
    pub region: String,
    pub plan: String,
    pub health_check_path: String,
}

impl Default for HostingOptions {
    fn default() -> Self {
        Self {
            service_type: "web_service".to_string(),
            runtime: "python".to_string(),
            region: "oregon".to_string(),
            plan: "free".to_string(),
            health_check_path: "/".to_string(),
        }
    }
}

/// Pick the file to run: the designated entry point, else the first
/// recognized name present, else any python file.
pub fn resolve_entry_point(deployment: &Deployment) -> Option<String> {
    if let Some(entry) = &deployment.entry_point {
        if deployment.files.contains_key(entry) {
            return Some(entry.clone());
        }
    }
    ENTRY_POINTS
        .iter()
        .find(|name| deployment.files.contains_key(**name))
        .map(|name| name.to_string())
        .or_else(|| {
            deployment
                .files
                .keys()
                .find(|name| name.ends_with(".py"))
                .cloned()
        })
}

pub fn start_command(entry_point: &str) -> String {
    if entry_point == "__main__.py" {
        "python -m .".to_string()
    } else {
        format!("python {}", entry_point)
    }
}

pub fn build_command(deps: &[String]) -> String {
    if deps.is_empty() {
        "echo 'No requirements to install'".to_string()
    } else {
        "pip install -r requirements.txt".to_string()
    }
}

pub fn service_spec(deployment: &Deployment, entry_point: &str, hosting: &HostingOptions) -> ServiceSpec {
    ServiceSpec {
        service_type: hosting.service_type.clone(),
        name: deployment.name.clone(),
        runtime: hosting.runtime.clone(),
        region: hosting.region.clone(),
        plan: hosting.plan.clone(),
        env_vars: vec![
            EnvVar {
                key: TOKEN_ENV.to_string(),
                value: deployment.token.clone(),
            },
            EnvVar {
                key: "PYTHON_VERSION".to_string(),
                value: PYTHON_VERSION.to_string(),
            },
            EnvVar {
                key: "HOSTING_BOT".to_string(),
                value: "true".to_string(),
            },
        ],
        build_command: build_command(&deployment.deps),
        start_command: start_command(entry_point),
        health_check_path: hosting.health_check_path.clone(),
    }
}
