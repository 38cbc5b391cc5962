// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Native Ingress support.
//!
//! Ingress resources claiming this controller's class are translated into
//! synthetic VirtualServers and flow through the regular VirtualServer
//! pipeline: composition, rendering and the reload decision all behave as
//! if the user had written the equivalent VirtualServer. The synthetic
//! server is named `ingress-<name>`, so it can never collide with a real
//! VirtualServer's rendered config object.
//!
//! Ingress objects carry no operator-owned status subresource; outcomes
//! are reported through Events only.

use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;

use crate::constants::{INGRESS_CLASS, INGRESS_CLASS_ANNOTATION};
use crate::crd::{
    Route, RouteAction, Upstream, VirtualServer, VirtualServerSpec, VirtualServerTls,
};

/// Name of the synthetic VirtualServer an Ingress translates into.
#[must_use]
pub fn synthetic_name(ingress_name: &str) -> String {
    format!("ingress-{ingress_name}")
}

/// Whether an Ingress claims this controller's class.
///
/// `spec.ingressClassName` wins; the legacy annotation is honoured when
/// the field is absent.
#[must_use]
pub fn claims_ingress(ingress: &Ingress) -> bool {
    if let Some(class) = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref())
    {
        return class == INGRESS_CLASS;
    }
    ingress
        .annotations()
        .get(INGRESS_CLASS_ANNOTATION)
        .map(String::as_str)
        == Some(INGRESS_CLASS)
}

/// Translate an Ingress into its equivalent VirtualServer.
///
/// The first rule carrying a host is translated; each path becomes a route
/// passing to a generated `backend-<i>` upstream. An unspecified backend
/// port defaults to 80, an unspecified path to `/`.
///
/// Returns `None` when the Ingress claims another class or has no usable
/// host rule with service backends.
#[must_use]
pub fn virtual_server_from_ingress(ingress: &Ingress) -> Option<VirtualServer> {
    if !claims_ingress(ingress) {
        return None;
    }
    let spec = ingress.spec.as_ref()?;
    let rule = spec
        .rules
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find(|rule| rule.host.is_some())?;
    let host = rule.host.clone()?;

    let mut upstreams = Vec::new();
    let mut routes = Vec::new();
    let paths = rule
        .http
        .as_ref()
        .map(|http| http.paths.as_slice())
        .unwrap_or_default();
    for (index, path) in paths.iter().enumerate() {
        let Some(service) = path.backend.service.as_ref() else {
            continue;
        };
        let port = service
            .port
            .as_ref()
            .and_then(|port| port.number)
            .and_then(|number| u16::try_from(number).ok())
            .unwrap_or(80);
        let upstream = format!("backend-{index}");
        upstreams.push(Upstream {
            name: upstream.clone(),
            service: service.name.clone(),
            port,
            ..Upstream::default()
        });
        routes.push(Route {
            path: path.path.clone().unwrap_or_else(|| "/".to_string()),
            action: Some(RouteAction {
                pass: Some(upstream),
            }),
            splits: None,
        });
    }
    if upstreams.is_empty() {
        return None;
    }

    let tls = spec
        .tls
        .as_deref()
        .unwrap_or_default()
        .iter()
        .find_map(|tls| tls.secret_name.clone())
        .map(|secret| VirtualServerTls {
            secret: Some(secret),
            cert_manager: None,
            redirect: None,
        });

    let mut vs = VirtualServer::new(
        &synthetic_name(&ingress.name_any()),
        VirtualServerSpec {
            host,
            tls,
            upstreams,
            routes,
            external_dns: None,
            policies: None,
            listener: None,
        },
    );
    vs.metadata.namespace = ingress.namespace();
    Some(vs)
}

/// Services an Ingress routes to, for dependency requeueing.
#[must_use]
pub fn backend_services(ingress: &Ingress) -> Vec<String> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };
    spec.rules
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| &http.paths)
        .filter_map(|path| path.backend.service.as_ref())
        .map(|service| service.name.clone())
        .collect()
}

/// TLS Secrets an Ingress references, for dependency requeueing.
#[must_use]
pub fn tls_secrets(ingress: &Ingress) -> Vec<String> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };
    spec.tls
        .as_deref()
        .unwrap_or_default()
        .iter()
        .filter_map(|tls| tls.secret_name.clone())
        .collect()
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
