// Raw pcs transactions
pub mod cib;

// Declared resources
pub mod resource;

use anyhow::{Context as _, Result};
use cibkit::Client;

use crate::Context;

/// Build a client for the configured cluster, probing `crm_diff` once.
pub fn client(ctx: &Context) -> Result<Client> {
    Client::new(ctx.config.cluster.clone()).context("Could not prepare the cluster client")
}
