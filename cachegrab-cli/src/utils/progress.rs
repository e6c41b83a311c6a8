use cachegrab_engine::{ExtractionStatus, ProgressEvent};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

fn walk_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn extract_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[derive(Default)]
struct Bars {
    walk: Option<ProgressBar>,
    extract: Option<ProgressBar>,
}

#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    bars: Arc<Mutex<Bars>>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Arc::new(Mutex::new(Bars::default())),
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Arc::new(Mutex::new(Bars::default())),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: ProgressEvent) {
        if self.disabled {
            return;
        }

        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        match event {
            ProgressEvent::WalkStarted { root } => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(walk_style());
                bar.set_message(format!("Reading cache {}", root.display()));
                bar.enable_steady_tick(Duration::from_millis(200));
                bars.walk = Some(bar);
            }
            ProgressEvent::FileVisited { found } => {
                if let Some(bar) = &bars.walk {
                    bar.set_position(found);
                    if found % 256 == 0 {
                        bar.set_message(format!("{found} files visited"));
                    }
                }
            }
            ProgressEvent::WalkFinished { stats } => {
                if let Some(bar) = bars.walk.take() {
                    bar.finish_with_message(format!("Reading cache ...done. {stats}"));
                }
            }
            ProgressEvent::ExtractStarted { total } => {
                let bar = self.multi.add(ProgressBar::new(total as u64));
                bar.set_style(extract_style());
                bar.set_message("Extracting");
                bar.enable_steady_tick(Duration::from_millis(500));
                bars.extract = Some(bar);
            }
            ProgressEvent::ObjectFinished { location, status } => {
                if let Some(bar) = &bars.extract {
                    match status {
                        ExtractionStatus::Extracted => bar.set_message(location),
                        ExtractionStatus::SkippedExists => {
                            bar.set_message(format!("{location} (exists)"))
                        }
                        ExtractionStatus::SkippedError => {
                            bar.set_message(format!("{location} (failed)"))
                        }
                    }
                    bar.inc(1);
                }
            }
            ProgressEvent::ExtractFinished { stats } => {
                if let Some(bar) = bars.extract.take() {
                    bar.finish_with_message(format!("Finished: {stats}"));
                }
            }
        }
    }

    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachegrab_engine::{ExtractStats, WalkStats};
    use indicatif::ProgressDrawTarget;
    use std::path::PathBuf;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn disabled_manager_ignores_events() {
        let manager = ProgressManager::new_disabled(hidden());
        manager.handle_event(ProgressEvent::ExtractStarted { total: 3 });
        assert!(manager.is_disabled());
        assert!(manager.bars.lock().unwrap().extract.is_none());
    }

    #[test]
    fn tracks_a_full_run() {
        let manager = ProgressManager::new(hidden());
        manager.handle_event(ProgressEvent::WalkStarted {
            root: PathBuf::from("/var/cache/polipo"),
        });
        manager.handle_event(ProgressEvent::FileVisited { found: 1 });
        manager.handle_event(ProgressEvent::WalkFinished {
            stats: WalkStats::default(),
        });
        assert!(manager.bars.lock().unwrap().walk.is_none());

        manager.handle_event(ProgressEvent::ExtractStarted { total: 2 });
        manager.handle_event(ProgressEvent::ObjectFinished {
            location: "http://h/a".into(),
            status: ExtractionStatus::Extracted,
        });
        manager.handle_event(ProgressEvent::ObjectFinished {
            location: "http://h/b".into(),
            status: ExtractionStatus::SkippedError,
        });
        {
            let bars = manager.bars.lock().unwrap();
            let bar = bars.extract.as_ref().unwrap();
            assert_eq!(bar.position(), 2);
            assert_eq!(bar.message(), "http://h/b (failed)");
        }

        manager.handle_event(ProgressEvent::ExtractFinished {
            stats: ExtractStats::default(),
        });
        assert!(manager.bars.lock().unwrap().extract.is_none());
    }
}
