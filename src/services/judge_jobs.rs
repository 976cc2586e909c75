use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;

type JobKey = (String, String);

/// In-flight background judge runs keyed by (submission id, question id).
///
/// At most one run is tracked per key: scheduling a newer run aborts the older one.
#[derive(Clone, Default)]
pub(crate) struct JudgeJobs {
    jobs: Arc<Mutex<HashMap<JobKey, (u64, JoinHandle<()>)>>>,
    generation: Arc<AtomicU64>,
}

impl JudgeJobs {
    fn lock(&self) -> MutexGuard<'_, HashMap<JobKey, (u64, JoinHandle<()>)>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn spawn<F>(&self, submission_id: &str, question_id: &str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = (submission_id.to_string(), question_id.to_string());
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let registry = self.clone();
        let finished_key = key.clone();

        // Held across spawn and insert so the task cannot deregister before it is registered.
        let mut jobs = self.lock();
        let handle = tokio::spawn(async move {
            job.await;
            registry.finish(&finished_key, generation);
        });
        if let Some((_, previous)) = jobs.insert(key, (generation, handle)) {
            previous.abort();
        }
    }

    fn finish(&self, key: &JobKey, generation: u64) {
        let mut jobs = self.lock();
        if jobs.get(key).is_some_and(|(current, _)| *current == generation) {
            jobs.remove(key);
        }
    }

    pub(crate) fn cancel(&self, submission_id: &str, question_id: &str) {
        let removed = self.lock().remove(&(submission_id.to_string(), question_id.to_string()));
        if let Some((_, handle)) = removed {
            handle.abort();
        }
    }

    /// Waits for every run tracked for the submission, including ones that finish by abort.
    pub(crate) async fn wait_for_submission(&self, submission_id: &str) {
        let handles: Vec<JoinHandle<()>> = {
            let mut jobs = self.lock();
            let keys: Vec<JobKey> =
                jobs.keys().filter(|(owner, _)| owner == submission_id).cloned().collect();
            keys.iter().filter_map(|key| jobs.remove(key)).map(|(_, handle)| handle).collect()
        };

        for handle in handles {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    tracing::error!(submission_id, error = %err, "Judge run panicked");
                }
            }
        }
    }

    pub(crate) fn in_flight(&self, submission_id: &str) -> usize {
        self.lock().keys().filter(|(owner, _)| owner == submission_id).count()
    }
}
