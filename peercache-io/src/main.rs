use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use peercache::builder::Builder;
use peercache::cache::DEFAULT_MAX_MEMORY;
use peercache::fmt::{format_size, parse_size};
use peercache::group::{Group, Source};
use peercache::node::Node;
use peercache::server::Server;
use yaml_rust::Yaml;

/// Serves the files below **data/<group>/** as values of the group.
struct FileSource {
    directory: PathBuf,
}

#[async_trait::async_trait]
impl Source for FileSource {
    async fn fetch(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        // Keys must not escape the directory of the group...
        let relative_path = Path::new(key);
        if !relative_path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            anyhow::bail!("Invalid key: {}", key);
        }

        let path = self.directory.join(relative_path);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Cannot read {}", path.to_string_lossy()))
    }
}

fn max_memory(settings: &Yaml) -> anyhow::Result<usize> {
    match &settings["max_memory"] {
        Yaml::String(size) => parse_size(size),
        Yaml::Integer(size) if *size >= 0 => Ok(*size as usize),
        Yaml::BadValue => Ok(DEFAULT_MAX_MEMORY),
        other => Err(anyhow::anyhow!("Invalid max_memory: {:?}", other)),
    }
}

fn create_groups(node: &Node) {
    let config = node.config().current();
    let groups = match config.query("groups").as_hash() {
        Some(groups) => groups.clone(),
        None => {
            log::warn!("No groups have been configured.");
            return;
        }
    };

    for (name, settings) in groups.iter() {
        let name = match name.as_str() {
            Some(name) => name,
            None => continue,
        };

        match max_memory(settings) {
            Ok(max_memory) => {
                log::info!(
                    "Serving data/{} as group {} ({})...",
                    name,
                    name,
                    format_size(max_memory)
                );
                let _ = node.create_group(Group::builder(name).max_memory(max_memory).source(
                    FileSource {
                        directory: Path::new("data").join(name),
                    },
                ));
            }
            Err(error) => log::error!("Cannot create group {}: {:#}", name, error),
        }
    }
}

#[tokio::main]
async fn main() {
    // Build a node and enable all features...
    let node = Builder::new().enable_all().build().await;

    create_groups(&node);

    Server::new(node).event_loop().await;
}
