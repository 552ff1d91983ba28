//! Asynchronous pathfinding.
//!
//! The simulation never waits for a path: requests are pushed onto a
//! bounded queue, a worker task answers them, and the session drains the
//! answers at the start of the next tick.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::JoinHandle;

use invasion_core::error::{GameError, Result};
use invasion_core::math::{fixed_decimal, Fixed, Vec2Fixed};
use invasion_core::pathfinding::{PathFailure, PathRequest, PathResult, PathService};

/// Upper bound on the waypoints a single route may hold.
pub const MAX_ROUTE_WAYPOINTS: u32 = 4096;

/// Navigator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Distance between consecutive waypoints.
    #[serde(with = "fixed_decimal")]
    pub waypoint_spacing: Fixed,
    /// Routes longer than this are refused with [`PathFailure::NoRoute`].
    #[serde(with = "fixed_decimal")]
    pub max_route_length: Fixed,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            waypoint_spacing: Fixed::from_num(2),
            max_route_length: Fixed::from_num(200),
        }
    }
}

impl NavigatorConfig {
    /// Reject settings that would produce unbounded routes.
    pub fn validate(&self) -> Result<()> {
        if self.max_route_length <= Fixed::ZERO {
            return Err(GameError::InvalidConfig(format!(
                "max_route_length must be positive, got {}",
                self.max_route_length
            )));
        }
        if self.waypoint_spacing <= Fixed::ZERO {
            return Err(GameError::InvalidConfig(format!(
                "waypoint_spacing must be positive, got {}",
                self.waypoint_spacing
            )));
        }
        let waypoints = self
            .max_route_length
            .checked_div(self.waypoint_spacing)
            .unwrap_or(Fixed::MAX);
        if waypoints > Fixed::from_num(MAX_ROUTE_WAYPOINTS) {
            return Err(GameError::InvalidConfig(format!(
                "waypoint_spacing {} allows more than {MAX_ROUTE_WAYPOINTS} waypoints per route",
                self.waypoint_spacing
            )));
        }
        Ok(())
    }
}

/// Open-ground navigator: straight lines split into evenly spaced
/// waypoints.
#[derive(Debug, Clone, Copy)]
pub struct Navigator {
    config: NavigatorConfig,
}

impl Navigator {
    /// Create a navigator.
    #[must_use]
    pub fn new(config: NavigatorConfig) -> Self {
        Self { config }
    }

    /// Answer one request.
    pub fn route(&self, request: &PathRequest) -> std::result::Result<Vec<Vec2Fixed>, PathFailure> {
        let length = request.origin.distance(request.destination);
        if length > self.config.max_route_length {
            return Err(PathFailure::NoRoute);
        }

        let mut waypoints = Vec::new();
        let spacing = self.config.waypoint_spacing;
        if spacing > Fixed::ZERO {
            let direction = (request.destination - request.origin).normalize();
            let mut travelled = spacing;
            while travelled < length {
                waypoints.push(request.origin + direction * travelled);
                travelled += spacing;
            }
        }
        waypoints.push(request.destination);
        Ok(waypoints)
    }
}

/// Handle to the worker task.
#[derive(Debug)]
pub struct PathWorker {
    handle: JoinHandle<()>,
}

impl PathWorker {
    /// Wait for the worker to finish.
    ///
    /// The worker stops once every [`ChannelPathService`] feeding it has
    /// been dropped.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("Path worker terminated abnormally: {}", e);
        }
    }
}

/// [`PathService`] backed by channels to a [`PathWorker`].
///
/// Requests that cannot be queued are answered locally with
/// [`PathFailure::Unavailable`] so the requesting agent is never left
/// waiting on a ticket that will not come back.
#[derive(Debug)]
pub struct ChannelPathService {
    requests: mpsc::Sender<PathRequest>,
    results: mpsc::Receiver<PathResult>,
    rejected: Vec<PathResult>,
}

impl ChannelPathService {
    /// Take every answer available right now without waiting.
    pub fn drain_results(&mut self) -> Vec<PathResult> {
        let mut results = std::mem::take(&mut self.rejected);
        loop {
            match self.results.try_recv() {
                Ok(result) => results.push(result),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        results
    }
}

impl PathService for ChannelPathService {
    fn submit(&mut self, request: PathRequest) {
        match self.requests.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                tracing::warn!(agent = request.requester, "Path queue full, rejecting request");
                self.rejected.push(PathResult::failed(
                    &request,
                    PathFailure::Unavailable("queue full".to_string()),
                ));
            }
            Err(TrySendError::Closed(request)) => {
                tracing::warn!(agent = request.requester, "Path worker gone, rejecting request");
                self.rejected.push(PathResult::failed(
                    &request,
                    PathFailure::Unavailable("worker stopped".to_string()),
                ));
            }
        }
    }
}

/// Spawn a worker task answering requests with a [`Navigator`].
///
/// Must be called from within a tokio runtime.
pub fn spawn_path_worker(
    config: NavigatorConfig,
    capacity: usize,
) -> (ChannelPathService, PathWorker) {
    let capacity = capacity.max(1);
    let (request_tx, mut request_rx) = mpsc::channel::<PathRequest>(capacity);
    let (result_tx, result_rx) = mpsc::channel::<PathResult>(capacity);
    let navigator = Navigator::new(config);

    let handle = tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            let result = match navigator.route(&request) {
                Ok(waypoints) => PathResult::found(&request, waypoints),
                Err(failure) => {
                    tracing::debug!(agent = request.requester, %failure, "No path");
                    PathResult::failed(&request, failure)
                }
            };
            if result_tx.send(result).await.is_err() {
                break;
            }
        }
        tracing::debug!("Path worker stopped");
    });

    let service = ChannelPathService {
        requests: request_tx,
        results: result_rx,
        rejected: Vec::new(),
    };
    (service, PathWorker { handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use invasion_core::pathfinding::PathTicket;

    fn request(ticket: u64, origin: Vec2Fixed, destination: Vec2Fixed) -> PathRequest {
        PathRequest {
            ticket: PathTicket(ticket),
            requester: 7,
            origin,
            destination,
        }
    }

    async fn wait_for(service: &mut ChannelPathService, count: usize) -> Vec<PathResult> {
        let mut results = Vec::new();
        while results.len() < count {
            tokio::task::yield_now().await;
            results.extend(service.drain_results());
        }
        results
    }

    #[test]
    fn test_navigator_subdivides() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let route = navigator
            .route(&request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(0, 5)))
            .unwrap();
        assert_eq!(
            route,
            vec![
                Vec2Fixed::from_ints(0, 2),
                Vec2Fixed::from_ints(0, 4),
                Vec2Fixed::from_ints(0, 5),
            ]
        );
    }

    #[test]
    fn test_config_bounds_route_size() {
        assert!(NavigatorConfig::default().validate().is_ok());

        let dense = NavigatorConfig {
            waypoint_spacing: Fixed::from_num(0.0001),
            ..NavigatorConfig::default()
        };
        assert!(matches!(dense.validate(), Err(GameError::InvalidConfig(_))));

        let flat = NavigatorConfig {
            waypoint_spacing: Fixed::ZERO,
            ..NavigatorConfig::default()
        };
        assert!(flat.validate().is_err());

        let nowhere = NavigatorConfig {
            max_route_length: Fixed::ZERO,
            ..NavigatorConfig::default()
        };
        assert!(nowhere.validate().is_err());
    }

    #[test]
    fn test_longest_valid_route_stays_bounded() {
        let config = NavigatorConfig {
            waypoint_spacing: Fixed::from_num(0.05),
            max_route_length: Fixed::from_num(200),
        };
        config.validate().unwrap();
        let route = Navigator::new(config)
            .route(&request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(199, 0)))
            .unwrap();
        assert!(route.len() <= MAX_ROUTE_WAYPOINTS as usize);
    }

    #[test]
    fn test_navigator_same_point() {
        let navigator = Navigator::new(NavigatorConfig::default());
        let here = Vec2Fixed::from_ints(3, 3);
        assert_eq!(navigator.route(&request(1, here, here)), Ok(vec![here]));
    }

    #[test]
    fn test_navigator_refuses_long_routes() {
        let navigator = Navigator::new(NavigatorConfig {
            max_route_length: Fixed::from_num(10),
            ..NavigatorConfig::default()
        });
        let result = navigator.route(&request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(11, 0)));
        assert_eq!(result, Err(PathFailure::NoRoute));
    }

    #[tokio::test]
    async fn test_worker_answers_in_order() {
        let (mut service, worker) = spawn_path_worker(NavigatorConfig::default(), 8);
        service.submit(request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(1, 0)));
        service.submit(request(2, Vec2Fixed::ZERO, Vec2Fixed::from_ints(500, 0)));

        let results = wait_for(&mut service, 2).await;

        assert_eq!(results[0].ticket, PathTicket(1));
        assert_eq!(results[0].outcome, Ok(vec![Vec2Fixed::from_ints(1, 0)]));
        assert_eq!(results[1].ticket, PathTicket(2));
        assert_eq!(results[1].outcome, Err(PathFailure::NoRoute));

        drop(service);
        worker.join().await;
    }

    #[tokio::test]
    async fn test_full_queue_rejects_locally() {
        let (mut service, worker) = spawn_path_worker(NavigatorConfig::default(), 1);
        // Nothing yields between submits, so the worker cannot drain the
        // single slot.
        service.submit(request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(1, 0)));
        service.submit(request(2, Vec2Fixed::ZERO, Vec2Fixed::from_ints(2, 0)));

        let results = wait_for(&mut service, 2).await;

        let rejected = results
            .iter()
            .find(|result| result.ticket == PathTicket(2))
            .unwrap();
        assert!(matches!(rejected.outcome, Err(PathFailure::Unavailable(_))));
        assert!(results
            .iter()
            .any(|result| result.ticket == PathTicket(1) && result.outcome.is_ok()));

        drop(service);
        worker.join().await;
    }
}
