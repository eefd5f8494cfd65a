//! JSON shapes of list responses.

use serde::Deserialize;

use pingwatch_core::{DataPoint, Machine};

/// A monitoring API list page.
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    pub values: Vec<T>,
    #[serde(default)]
    pub metadata: PageMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageMetadata {
    pub next_marker: Option<String>,
}

/// A metric plot; not paginated.
#[derive(Debug, Deserialize)]
pub(crate) struct Plot {
    pub values: Vec<DataPoint>,
}

/// A compute `/servers/detail` page.
#[derive(Debug, Deserialize)]
pub(crate) struct ServersPage {
    pub servers: Vec<Server>,
    #[serde(default)]
    pub servers_links: Vec<Link>,
}

impl ServersPage {
    pub fn has_next(&self) -> bool {
        self.servers_links.iter().any(|l| l.rel == "next")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Server {
    pub id: String,
    pub name: String,
}

impl Server {
    pub fn into_machine(self, region: &str) -> Machine {
        Machine {
            id: self.id,
            name: self.name,
            region: region.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Link {
    pub rel: String,
}
