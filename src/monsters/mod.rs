// Monster roster maintenance: bundled defaults and image backfill.

pub mod defaults;
pub mod image_sync;
