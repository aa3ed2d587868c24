use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::selector::Selector;
use crate::source::CONTROLLER_ANNOTATION_VALUE;

const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    pub annotation_filter: String,
    pub fqdn_template: String,
    pub label_selector: Selector,
    pub controller: String,
    pub suppress_ipv6: bool,
    pub resync_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            annotation_filter: String::new(),
            fqdn_template: String::new(),
            label_selector: Selector::everything(),
            controller: CONTROLLER_ANNOTATION_VALUE.to_string(),
            suppress_ipv6: true,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(annotation_filter) = lookup("DDNS_ANNOTATION_FILTER") {
            config.annotation_filter = annotation_filter;
        }

        if let Some(fqdn_template) = lookup("DDNS_FQDN_TEMPLATE") {
            config.fqdn_template = fqdn_template;
        }

        if let Some(label_selector) = lookup("DDNS_LABEL_SELECTOR") {
            config.label_selector = label_selector
                .parse()
                .context("parse DDNS_LABEL_SELECTOR failed")?;
        }

        if let Some(controller) = lookup("DDNS_CONTROLLER_NAME").filter(|name| !name.is_empty()) {
            config.controller = controller;
        }

        if let Some(suppress_ipv6) = lookup("DDNS_SUPPRESS_IPV6") {
            config.suppress_ipv6 = suppress_ipv6
                .parse()
                .with_context(|| format!("invalid DDNS_SUPPRESS_IPV6 {:?}", suppress_ipv6))?;
        }

        if let Some(resync_interval) = lookup("DDNS_RESYNC_INTERVAL") {
            let secs: u64 = resync_interval
                .parse()
                .with_context(|| format!("invalid DDNS_RESYNC_INTERVAL {:?}", resync_interval))?;
            if secs == 0 {
                return Err(anyhow::anyhow!("DDNS_RESYNC_INTERVAL must be greater than 0"));
            }

            config.resync_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}
