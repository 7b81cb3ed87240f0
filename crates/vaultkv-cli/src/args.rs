use std::collections::BTreeMap;

use clap::{Parser, Subcommand};

/// Read and write secrets in a Vault-compatible KV v2 store
#[derive(Parser, Debug)]
#[command(name = "vaultkv")]
#[command(about = "Read and write secrets in a Vault-compatible KV v2 store")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "vaultkv.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read a secret, e.g. `read v1/kv/data/database-secrets`
    Read {
        /// Full request path below the store URL
        path: String,

        /// Only return this key
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Create or overwrite a secret
    Create {
        /// Secret engine mount, e.g. `kv`
        engine: String,

        /// Secret name
        name: String,

        /// Field to store (repeatable)
        #[arg(short, long = "data", value_parser = parse_pair)]
        data: Vec<(String, String)>,

        /// Engine option such as `cas=0` (repeatable)
        #[arg(short, long = "option", value_parser = parse_pair)]
        options: Vec<(String, String)>,
    },

    /// Merge changes into an existing secret
    Patch {
        engine: String,

        name: String,

        /// Field to upsert (repeatable)
        #[arg(short, long = "data", value_parser = parse_pair)]
        data: Vec<(String, String)>,

        /// Field to remove (repeatable)
        #[arg(long = "delete")]
        delete: Vec<String>,

        #[arg(short, long = "option", value_parser = parse_pair)]
        options: Vec<(String, String)>,
    },

    /// Permanently destroy one version of a secret
    Destroy {
        engine: String,

        name: String,

        /// Version to destroy, defaults to 1
        #[arg(long)]
        version: Option<u64>,
    },
}

/// Parse `key=value`; the value may itself contain `=`
pub fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err("expected key=value".to_string()),
    }
}

pub fn into_map(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().collect()
}

/// Combine upserts and deletions into a merge-patch map; a deletion wins over an upsert of the same key
pub fn patch_map(data: Vec<(String, String)>, delete: Vec<String>) -> BTreeMap<String, Option<String>> {
    let mut patch: BTreeMap<String, Option<String>> =
        data.into_iter().map(|(k, v)| (k, Some(v))).collect();
    for key in delete {
        patch.insert(key, None);
    }
    patch
}
