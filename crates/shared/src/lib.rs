mod run_id;

pub use run_id::{ALPHABET, RUN_ID_LENGTH, RunId};
