use std::sync::Arc;

use chrono::{Duration, Utc};
use rocket::{
    fairing::{Fairing, Info, Kind},
    futures::future::{BoxFuture, FutureExt},
    tokio::sync::Mutex,
    Build, Orbit, Rocket,
};

use crate::{config::Config, scheduled_task::ScheduledTask, voting::session::SessionManager};

/// The next scheduled sweep, if sweeping is running.
type TaskSlot = Arc<Mutex<Option<ScheduledTask<()>>>>;

/// Periodically lapses sessions whose time is up.
///
/// Sweeping is never required for correctness, since reads lapse sessions
/// too. It frees voter slots and keeps stored statuses honest.
pub struct SessionSweeper {
    task: TaskSlot,
}

impl SessionSweeper {
    pub fn new() -> Self {
        Self {
            task: Default::default(),
        }
    }

    /// Start sweeping now and every `interval` thereafter, replacing any
    /// previous schedule.
    pub async fn start(&self, sessions: SessionManager, interval: Duration) {
        let sweep = Self::sweeper(sessions, interval, self.task.clone());
        let mut task_locked = self.task.lock().await;
        if let Some(task) = task_locked.take() {
            task.cancel().await;
        }
        *task_locked = Some(ScheduledTask::new(sweep, Utc::now()));
    }

    /// Stop sweeping.
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.cancel().await;
            debug!("Session sweeper stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Sweep once, then schedule the next sweep in the slot unless stopped.
    /// Since this is a recursive async function, we must use `BoxFuture` to
    /// avoid an infinitely-recursive state machine.
    fn sweeper(
        sessions: SessionManager,
        interval: Duration,
        task: TaskSlot,
    ) -> BoxFuture<'static, ()> {
        async move {
            match sessions.sweep(Utc::now()).await {
                Ok(summary) if summary.is_empty() => trace!("Session sweep had nothing to do"),
                Ok(summary) => info!("Session sweep: {summary}"),
                Err(e) => error!("Session sweep failed, will retry: {e}"),
            }

            let next = Self::sweeper(sessions, interval, task.clone());
            let mut task_locked = task.lock().await;
            // An empty slot means we were stopped mid-sweep.
            if task_locked.is_some() {
                *task_locked = Some(ScheduledTask::new(next, Utc::now() + interval));
            }
        }
        .boxed()
    }
}

impl Default for SessionSweeper {
    fn default() -> Self {
        Self::new()
    }
}

/// A fairing that starts the session sweeper during ignition, places it into
/// managed state, and stops it on shutdown.
/// Depends on the config and the voting services, so must be attached after
/// the fairings responsible for those.
pub struct SessionSweeperFairing;

#[rocket::async_trait]
impl Fairing for SessionSweeperFairing {
    fn info(&self) -> Info {
        Info {
            name: "Session sweeper",
            kind: Kind::Ignite | Kind::Shutdown,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (sessions, interval) =
            match (rocket.state::<SessionManager>(), rocket.state::<Config>()) {
                (Some(sessions), Some(config)) => (sessions.clone(), config.sweep_interval()),
                _ => {
                    error!("Voting services were not available when starting the session sweeper");
                    return Err(rocket);
                }
            };

        let sweeper = SessionSweeper::new();
        sweeper.start(sessions, interval).await;
        info!(
            "Session sweeper running every {}s",
            interval.num_seconds()
        );

        rocket = rocket.manage(sweeper);
        Ok(rocket)
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        if let Some(sweeper) = rocket.state::<SessionSweeper>() {
            sweeper.stop().await;
        }
    }
}
