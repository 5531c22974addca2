//! Tera template set shared by the outbound message and the widget page.
//!
//! Both templates are compiled into the binary. When a template directory is
//! configured, a file there with the same name replaces the embedded copy.

use std::path::{Path, PathBuf};

use scrapbook_flock::message::MESSAGE_TEMPLATE;
use tera::Tera;
use thiserror::Error;
use tracing::info;

pub const WIDGET_TEMPLATE: &str = "scraps.html";

const EMBEDDED: [(&str, &str); 2] = [
    (MESSAGE_TEMPLATE, include_str!("../../../templates/message.flockml")),
    (WIDGET_TEMPLATE, include_str!("../../../templates/scraps.html")),
];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("could not read template `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("template `{name}` is invalid: {source}")]
    Parse { name: &'static str, source: tera::Error },
}

pub fn load(override_dir: Option<&Path>) -> Result<Tera, TemplateError> {
    let mut tera = Tera::default();

    for (name, embedded) in EMBEDDED {
        let overridden = override_dir.map(|dir| dir.join(name)).filter(|path| path.is_file());
        let source = match overridden {
            Some(path) => {
                info!(
                    event_name = "system.templates.override_loaded",
                    correlation_id = "bootstrap",
                    template = name,
                    path = %path.display(),
                    "using template override"
                );
                std::fs::read_to_string(&path)
                    .map_err(|source| TemplateError::Read { path, source })?
            }
            None => embedded.to_owned(),
        };

        tera.add_raw_template(name, &source)
            .map_err(|source| TemplateError::Parse { name, source })?;
    }

    Ok(tera)
}
