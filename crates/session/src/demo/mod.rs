mod file;
mod names;
mod player;
mod recorder;

pub use file::{DemoReader, DemoRecord, DemoWriter};
pub use names::{demo_file_name, final_record_path, open_demo, record_base};
pub use player::DemoPlayer;
pub use recorder::{DemoRecorder, DemoStreamState, StopOutcome, emit_packet_entities};

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_COUNTER: AtomicU32 = AtomicU32::new(0);

    pub fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "strafe-{}-{}-{}",
            name,
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
