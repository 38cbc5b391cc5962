// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

//! Rendering of NGINX configuration fragments.
//!
//! Renderers are pure: a composed resource view in, a configuration string
//! out. The configurator decides what to do with the string (write, diff,
//! reload). Output is deterministic so unchanged inputs produce
//! byte-identical renders and never dirty the reload decision.

use super::resources::{passthrough_socket, TransportServerEx, VirtualServerEx};
use crate::crd::{Policy, Route, Upstream};
use std::fmt::Write as _;

/// Render the `conf.d/` fragment for a `VirtualServer`.
///
/// On NGINX Plus (`plus = true`) upstream blocks carry a `state` directive
/// instead of inline peers: membership and weights live in the Plus API's
/// state file and change without touching the render, so endpoint churn
/// never forces a reload. On OSS peers and split weights are inline and any
/// change to them reloads.
#[must_use]
pub fn render_virtual_server(ex: &VirtualServerEx, plus: bool) -> String {
    let spec = &ex.virtual_server.spec;
    let config_name = ex.config_name();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "# Generated for VirtualServer {}/{}",
        ex.namespace(),
        ex.name()
    );

    for upstream in &spec.upstreams {
        render_upstream(&mut out, &ex.upstream_name(&upstream.name), upstream, ex, plus);
    }
    for route in &ex.routes {
        let ns = route.metadata.namespace.as_deref().unwrap_or("default");
        let name = route.metadata.name.as_deref().unwrap_or_default();
        for upstream in &route.spec.upstreams {
            let group = super::resources::upstream_name("vsr", ns, name, &upstream.name);
            render_upstream(&mut out, &group, upstream, ex, plus);
        }
    }

    // Merged groups for weighted splits, one per splits route.
    let mut split_index = 0usize;
    for route in &spec.routes {
        if let Some(splits) = &route.splits {
            let group = format!("{config_name}_split_{split_index}");
            let _ = writeln!(out, "upstream {group} {{");
            let _ = writeln!(out, "    zone {group} 256k;");
            if plus {
                let _ = writeln!(out, "    state state_files/{group}.state;");
            } else {
                for split in splits {
                    if let Some(pass) = &split.action.pass {
                        let source = ex.upstream_name(pass);
                        for peer in ex.endpoints.get(&source).map_or(&[][..], |p| p) {
                            let _ = writeln!(out, "    server {peer} weight={};", split.weight);
                        }
                    }
                }
            }
            let _ = writeln!(out, "}}");
            split_index += 1;
        }
    }

    for policy in resolved_policies(ex) {
        render_rate_limit_zone(&mut out, ex, policy);
    }

    // Redirect server on the HTTP port when TLS redirect is enabled.
    let tls = spec.tls.as_ref();
    let redirect = tls
        .and_then(|t| t.redirect.as_ref())
        .filter(|r| r.enable);
    if let Some(redirect) = redirect {
        let code = redirect.code.unwrap_or(301);
        let _ = writeln!(out, "server {{");
        let _ = writeln!(out, "    listen {};", ex.http_port);
        let _ = writeln!(out, "    server_name {};", spec.host);
        let _ = writeln!(out, "    return {code} https://$host$request_uri;");
        let _ = writeln!(out, "}}");
    }

    let _ = writeln!(out, "server {{");
    if redirect.is_none() {
        let _ = writeln!(out, "    listen {};", ex.http_port);
    }
    if let Some(tls) = tls {
        if let Some(secret) = &tls.secret {
            let _ = writeln!(out, "    listen {} ssl;", ex.https_port);
            let _ = writeln!(
                out,
                "    ssl_certificate secrets/{}-{secret};",
                ex.namespace()
            );
            let _ = writeln!(
                out,
                "    ssl_certificate_key secrets/{}-{secret};",
                ex.namespace()
            );
        }
    }
    let _ = writeln!(out, "    server_name {};", spec.host);

    for policy in resolved_policies(ex) {
        render_server_policy(&mut out, ex, policy);
    }

    split_index = 0;
    for route in &spec.routes {
        render_route(&mut out, ex, route, &config_name, &mut split_index);
    }
    for vsr in &ex.routes {
        let ns = vsr.metadata.namespace.as_deref().unwrap_or("default");
        let name = vsr.metadata.name.as_deref().unwrap_or_default();
        for route in &vsr.spec.subroutes {
            if let Some(pass) = route.action.as_ref().and_then(|a| a.pass.as_ref()) {
                let group = super::resources::upstream_name("vsr", ns, name, pass);
                let _ = writeln!(out, "    location {} {{", route.path);
                let _ = writeln!(out, "        proxy_pass http://{group};");
                let _ = writeln!(out, "    }}");
            }
        }
    }

    let _ = writeln!(out, "}}");
    out
}

/// Render the `stream-conf.d/` fragment for a `TransportServer`.
#[must_use]
pub fn render_transport_server(ex: &TransportServerEx, plus: bool) -> String {
    let spec = &ex.transport_server.spec;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "# Generated for TransportServer {}/{}",
        ex.namespace(),
        ex.name()
    );

    for upstream in &spec.upstreams {
        let group = ex.upstream_name(&upstream.name);
        let _ = writeln!(out, "upstream {group} {{");
        let _ = writeln!(out, "    zone {group} 256k;");
        if plus {
            let _ = writeln!(out, "    state state_files/{group}.state;");
        } else {
            let peers = ex.endpoints.get(&group).map_or(&[][..], |p| p);
            if peers.is_empty() {
                let _ = writeln!(out, "    server 127.0.0.1:1 down;");
            }
            for peer in peers {
                let mut line = format!("    server {peer}");
                if let Some(max_conns) = upstream.max_conns {
                    let _ = write!(line, " max_conns={max_conns}");
                }
                let _ = writeln!(out, "{line};");
            }
        }
        let _ = writeln!(out, "}}");
    }

    let _ = writeln!(out, "server {{");
    match ex.listener_port {
        Some(port) if spec.listener.protocol == "UDP" => {
            let _ = writeln!(out, "    listen {port} udp;");
        }
        Some(port) => {
            let _ = writeln!(out, "    listen {port};");
        }
        // TLS passthrough: the 443 multiplexer proxies here by SNI.
        None => {
            let _ = writeln!(
                out,
                "    listen {} proxy_protocol;",
                passthrough_socket(ex.namespace(), ex.name())
            );
        }
    }
    if let Some(tls) = &spec.tls {
        let _ = writeln!(out, "    ssl_certificate secrets/{}-{};", ex.namespace(), tls.secret);
        let _ = writeln!(
            out,
            "    ssl_certificate_key secrets/{}-{};",
            ex.namespace(),
            tls.secret
        );
    }
    let _ = writeln!(out, "    proxy_pass {};", ex.upstream_name(&spec.action.pass));
    let _ = writeln!(out, "}}");
    out
}

/// Render one upstream block with its live peers (or a Plus state file).
fn render_upstream(
    out: &mut String,
    group: &str,
    upstream: &Upstream,
    ex: &VirtualServerEx,
    plus: bool,
) {
    let _ = writeln!(out, "upstream {group} {{");
    let _ = writeln!(out, "    zone {group} 256k;");
    if let Some(method) = &upstream.lb_method {
        let _ = writeln!(out, "    {method};");
    }
    if plus {
        let _ = writeln!(out, "    state state_files/{group}.state;");
    } else {
        let peers = ex.endpoints.get(group).map_or(&[][..], |p| p);
        if peers.is_empty() {
            // An empty upstream block is a config error; park the group on a
            // closed port until endpoints arrive.
            let _ = writeln!(out, "    server 127.0.0.1:1 down;");
        }
        for peer in peers {
            let mut line = format!("    server {peer}");
            if let Some(max_fails) = upstream.max_fails {
                let _ = write!(line, " max_fails={max_fails}");
            }
            if let Some(fail_timeout) = &upstream.fail_timeout {
                let _ = write!(line, " fail_timeout={fail_timeout}");
            }
            let _ = writeln!(out, "{line};");
        }
    }
    if let Some(keepalive) = upstream.keepalive {
        let _ = writeln!(out, "    keepalive {keepalive};");
    }
    let _ = writeln!(out, "}}");
}

/// Render one route as a location block.
fn render_route(
    out: &mut String,
    ex: &VirtualServerEx,
    route: &Route,
    config_name: &str,
    split_index: &mut usize,
) {
    if route.splits.is_some() {
        let group = format!("{config_name}_split_{split_index}");
        *split_index += 1;
        let _ = writeln!(out, "    location {} {{", route.path);
        let _ = writeln!(out, "        proxy_pass http://{group};");
        let _ = writeln!(out, "    }}");
        return;
    }
    if let Some(pass) = route.action.as_ref().and_then(|a| a.pass.as_ref()) {
        let _ = writeln!(out, "    location {} {{", route.path);
        let _ = writeln!(out, "        proxy_pass http://{};", ex.upstream_name(pass));
        let _ = writeln!(out, "    }}");
    }
}

/// Policies referenced by the server, in declaration order, skipping
/// references the reconciler could not resolve.
fn resolved_policies(ex: &VirtualServerEx) -> impl Iterator<Item = &Policy> {
    ex.virtual_server
        .spec
        .policies
        .iter()
        .flatten()
        .filter_map(|r| {
            let ns = r.namespace.as_deref().unwrap_or(ex.namespace());
            ex.policies.get(&format!("{ns}/{}", r.name)).map(|p| p.as_ref())
        })
}

/// Shared-memory zone name for a rate-limit policy.
fn rate_limit_zone(policy: &Policy) -> String {
    format!(
        "rl_{}_{}",
        policy.metadata.namespace.as_deref().unwrap_or("default"),
        policy.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Rate-limit zones live at http level, above the server block.
fn render_rate_limit_zone(out: &mut String, _ex: &VirtualServerEx, policy: &Policy) {
    if let Some(rl) = &policy.spec.rate_limit {
        let zone = rate_limit_zone(policy);
        let key = rl.key.replace("${", "$").replace('}', "");
        let _ = writeln!(
            out,
            "limit_req_zone {key} zone={zone}:{} rate={};",
            rl.zone_size, rl.rate
        );
    }
}

/// Render a policy's server-level directives.
fn render_server_policy(out: &mut String, _ex: &VirtualServerEx, policy: &Policy) {
    let spec = &policy.spec;

    if let Some(ac) = &spec.access_control {
        for cidr in ac.allow.iter().flatten() {
            let _ = writeln!(out, "    allow {cidr};");
        }
        if ac.allow.is_some() {
            let _ = writeln!(out, "    deny all;");
        }
        for cidr in ac.deny.iter().flatten() {
            let _ = writeln!(out, "    deny {cidr};");
        }
        if ac.deny.is_some() {
            let _ = writeln!(out, "    allow all;");
        }
    }

    if let Some(rl) = &spec.rate_limit {
        let zone = rate_limit_zone(policy);
        let mut line = format!("    limit_req zone={zone}");
        if let Some(burst) = rl.burst {
            let _ = write!(line, " burst={burst}");
        }
        if rl.no_delay == Some(true) {
            let _ = write!(line, " nodelay");
        } else if let Some(delay) = rl.delay {
            let _ = write!(line, " delay={delay}");
        }
        let _ = writeln!(out, "{line};");
        if let Some(code) = rl.reject_code {
            let _ = writeln!(out, "    limit_req_status {code};");
        }
        if let Some(level) = &rl.log_level {
            let _ = writeln!(out, "    limit_req_log_level {level};");
        }
    }

    if let Some(jwt) = &spec.jwt {
        let _ = writeln!(out, "    auth_jwt \"{}\";", jwt.realm);
        let ns = policy.metadata.namespace.as_deref().unwrap_or("default");
        if let Some(secret) = &jwt.secret {
            let _ = writeln!(out, "    auth_jwt_key_file secrets/{ns}-{secret};");
        }
        if let Some(uri) = &jwt.jwks_uri {
            let _ = writeln!(out, "    auth_jwt_key_request /_jwks_uri;");
            let _ = writeln!(out, "    # jwks: {uri}");
        }
    }

    if let Some(basic) = &spec.basic_auth {
        let realm = basic.realm.as_deref().unwrap_or("Restricted");
        let ns = policy.metadata.namespace.as_deref().unwrap_or("default");
        let _ = writeln!(out, "    auth_basic \"{realm}\";");
        let _ = writeln!(out, "    auth_basic_user_file secrets/{ns}-{};", basic.secret);
    }

    if let Some(mtls) = &spec.ingress_mtls {
        let ns = policy.metadata.namespace.as_deref().unwrap_or("default");
        let _ = writeln!(
            out,
            "    ssl_client_certificate secrets/{ns}-{};",
            mtls.client_cert_secret
        );
        let mode = mtls.verify_client.as_deref().unwrap_or("on");
        let _ = writeln!(out, "    ssl_verify_client {mode};");
        if let Some(depth) = mtls.verify_depth {
            let _ = writeln!(out, "    ssl_verify_depth {depth};");
        }
    }

    if let Some(mtls) = &spec.egress_mtls {
        let ns = policy.metadata.namespace.as_deref().unwrap_or("default");
        if let Some(secret) = &mtls.tls_secret {
            let _ = writeln!(out, "    proxy_ssl_certificate secrets/{ns}-{secret};");
            let _ = writeln!(out, "    proxy_ssl_certificate_key secrets/{ns}-{secret};");
        }
        if let Some(secret) = &mtls.trusted_cert_secret {
            let _ = writeln!(out, "    proxy_ssl_trusted_certificate secrets/{ns}-{secret};");
        }
        if mtls.verify_server == Some(true) {
            let _ = writeln!(out, "    proxy_ssl_verify on;");
        }
        if let Some(name) = &mtls.ssl_name {
            let _ = writeln!(out, "    proxy_ssl_name {name};");
        }
    }
}

/// Mask peer weights in a render.
///
/// On OSS peers are inline, so a weight-only diff still needs a reload;
/// comparing masked renders is how that reload gets flagged as a weights
/// fallback in the reconciler's warning.
#[must_use]
pub fn mask_weights(render: &str) -> String {
    let mut out = String::with_capacity(render.len());
    for line in render.lines() {
        if let Some(pos) = line.find(" weight=") {
            let rest = &line[pos + " weight=".len()..];
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .map_or(rest.len(), |i| i);
            out.push_str(&line[..pos]);
            out.push_str(&rest[end..]);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod render_tests;
