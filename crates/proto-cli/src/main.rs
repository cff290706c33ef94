//! # proto-cli
//!
//! `protofeat`: resolve edition features for declaration tree manifests and
//! print the result.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use proto_features::{Edition, ManifestLoader, Resolution, ResolutionRegistry};
use proto_ir::{EntityId, EntityKind, FeatureSet, Root};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "protofeat")]
#[command(about = "Protobuf edition feature resolution")]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every entity of one or more manifests
    Resolve {
        /// Manifest files (YAML or JSON)
        #[arg(required = true)]
        manifests: Vec<PathBuf>,

        /// Only report this entity (scoped name, or fully qualified with a leading '.')
        #[arg(short, long)]
        entity: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Resolve a name against a manifest's tree
    Lookup {
        /// Manifest file (YAML or JSON)
        manifest: PathBuf,

        /// Name to resolve from the root scope
        name: String,

        /// Required entity kind
        #[arg(short, long, value_enum, default_value_t = KindFilter::Any)]
        kind: KindFilter,
    },

    /// Print the defaults row of an edition or syntax
    Defaults {
        /// `proto2`, `proto3` or `2023`
        edition: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindFilter {
    Any,
    Message,
    Enum,
    Service,
}

#[derive(Serialize)]
struct FileReport<'a> {
    manifest: String,
    edition: Edition,
    entities: Vec<EntityReport<'a>>,
}

#[derive(Serialize)]
struct EntityReport<'a> {
    name: String,
    kind: &'static str,
    features: &'a FeatureSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<&'a BTreeMap<String, FeatureSet>>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve {
            manifests,
            entity,
            format,
        } => resolve(&manifests, entity.as_deref(), format),
        Commands::Lookup {
            manifest,
            name,
            kind,
        } => lookup(&manifest, &name, kind),
        Commands::Defaults { edition, format } => {
            let edition: Edition = edition.parse()?;
            print(&edition.defaults(), format)
        }
    }
}

fn load(path: &Path) -> Result<Root> {
    ManifestLoader::default()
        .load_from_file(path)
        .with_context(|| format!("Failed to load manifest {}", path.display()))
}

fn resolve(manifests: &[PathBuf], entity: Option<&str>, format: Format) -> Result<()> {
    tracing::info!("Resolving {} manifest(s)", manifests.len());
    let trees = manifests.iter().map(|path| load(path)).collect::<Result<Vec<Root>>>()?;
    let registry = ResolutionRegistry::new();

    // Trees share nothing, so each one is resolved on its own thread.
    let resolutions = thread::scope(|scope| {
        let handles: Vec<_> = manifests
            .iter()
            .zip(&trees)
            .map(|(path, root)| {
                let registry = &registry;
                scope.spawn(move || {
                    registry
                        .resolve(&path.display().to_string(), root)
                        .with_context(|| format!("Failed to resolve {}", path.display()))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(_) => bail!("resolver thread panicked"),
            })
            .collect::<Result<Vec<Arc<Resolution>>>>()
    })?;

    let mut reports = Vec::with_capacity(trees.len());
    for ((path, root), resolution) in manifests.iter().zip(&trees).zip(&resolutions) {
        let ids: Vec<EntityId> = match entity {
            Some(name) => vec![
                root.lookup(name)
                    .with_context(|| format!("in {}", path.display()))?,
            ],
            None => root.ids().collect(),
        };
        let entities = ids
            .into_iter()
            .map(|id| entity_report(root, resolution, id))
            .collect::<Result<Vec<_>>>()?;
        reports.push(FileReport {
            manifest: path.display().to_string(),
            edition: resolution.edition(),
            entities,
        });
    }

    print(&reports, format)
}

fn entity_report<'a>(
    root: &Root,
    resolution: &'a Resolution,
    id: EntityId,
) -> Result<EntityReport<'a>> {
    let entity = root.get(id)?;
    let features = resolution
        .features(id)
        .with_context(|| format!("no resolved features for {}", entity.full_name()))?;
    let name = if entity.full_name().is_empty() {
        ".".to_string()
    } else {
        entity.full_name().to_string()
    };
    Ok(EntityReport {
        name,
        kind: entity.kind().as_str(),
        features,
        values: resolution.values_features(id),
    })
}

fn lookup(manifest: &Path, name: &str, kind: KindFilter) -> Result<()> {
    let root = load(manifest)?;
    let id = match kind {
        KindFilter::Any => root.lookup(name)?,
        KindFilter::Message => root.lookup_kind(EntityId::ROOT, name, EntityKind::Message)?,
        KindFilter::Enum => root.lookup_kind(EntityId::ROOT, name, EntityKind::Enum)?,
        KindFilter::Service => root.lookup_kind(EntityId::ROOT, name, EntityKind::Service)?,
    };
    let entity = root.get(id)?;
    println!("{} {}", entity.full_name(), entity.kind());
    Ok(())
}

fn print<T: Serialize>(value: &T, format: Format) -> Result<()> {
    let rendered = match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}
