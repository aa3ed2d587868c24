use thiserror::Error;

use crate::selector::ParseSelectorError;
use crate::template::TemplateError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid fqdn template: {0}")]
    InvalidTemplate(#[from] TemplateError),

    #[error("invalid annotation filter: {0}")]
    InvalidAnnotationFilter(#[from] ParseSelectorError),

    #[error("node {node:?} has neither ExternalIP nor InternalIP addresses")]
    AddressUnavailable { node: String },

    #[error("read nodes failed: {0}")]
    Upstream(anyhow::Error),
}

impl From<kube::runtime::watcher::Error> for Error {
    fn from(err: kube::runtime::watcher::Error) -> Self {
        Self::Upstream(err.into())
    }
}
