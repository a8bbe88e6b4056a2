use crate::engine;
use crate::error::Result;
use std::path::Path;

pub async fn execute(config: &Path) -> Result<()> {
    engine::run(config).await
}
