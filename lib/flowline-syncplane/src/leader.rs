//! Leader election: exactly one process in the fleet dispatches `flow:step`
//! tasks at a time, held by periodically extending a dedicated mutex key.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::mutex::DistributedMutex;

const LEADER_KEY: &str = "scheduler-leader";

/// Runs the leader-election loop until `shutdown` fires. While leader,
/// publishes `true` on `is_leader`; while not, `false`.
///
/// Extends the lease at half the TTL per the spec; on extension failure
/// the loop treats itself as having lost leadership and falls back to
/// retrying election on the same cadence.
pub async fn run(
    mutex: Arc<dyn DistributedMutex>,
    election_interval: Duration,
    is_leader: watch::Sender<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let half_ttl = election_interval / 2;
    let mut ticker = tokio::time::interval(half_ttl);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    let _ = mutex.unlock(LEADER_KEY).await;
                    let _ = is_leader.send(false);
                    return;
                }
            }
        }

        let currently_leader = *is_leader.borrow();
        let outcome = if currently_leader {
            mutex.extend(LEADER_KEY, election_interval).await
        } else {
            mutex.lock(LEADER_KEY, election_interval).await
        };

        let now_leader = outcome.is_ok();
        if now_leader != currently_leader {
            tracing::info!(leader = now_leader, "leader election state changed");
        }
        let _ = is_leader.send(now_leader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::InMemoryMutex;

    #[tokio::test]
    async fn a_single_contender_becomes_and_stays_leader() {
        let mutex: Arc<dyn DistributedMutex> = Arc::new(InMemoryMutex::new());
        let (leader_tx, mut leader_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run(mutex, Duration::from_millis(20), leader_tx, shutdown_rx));

        leader_rx.changed().await.unwrap();
        assert!(*leader_rx.borrow());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn a_second_contender_does_not_win_while_the_first_holds() {
        let mutex: Arc<dyn DistributedMutex> = Arc::new(InMemoryMutex::new());
        mutex.lock("scheduler-leader", Duration::from_secs(10)).await.unwrap();

        let (leader_tx, mut leader_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(mutex, Duration::from_millis(20), leader_tx, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!*leader_rx.borrow_and_update());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
