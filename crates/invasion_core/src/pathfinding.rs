//! Path requests against an external pathfinding service.
//!
//! The pathfinding algorithm itself lives outside the core. The core only
//! issues [`PathRequest`]s through a [`PathService`] and later receives a
//! [`PathResult`], on a subsequent tick, which it applies through
//! [`PathRequestClient::complete`].
//!
//! # Guarantees
//!
//! - At most one request per agent is outstanding; further requests are
//!   refused until the pending one completes.
//! - A failed request leaves the previously cached [`Route`] untouched.
//! - A successful request replaces the route wholesale and resets its
//!   waypoint cursor to 0.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::EntityId;
use crate::math::Vec2Fixed;

/// Handle identifying one path request of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathTicket(pub u64);

/// A request handed to the pathfinding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathRequest {
    /// Handle to echo back in the result.
    pub ticket: PathTicket,
    /// Agent that asked for the path.
    pub requester: EntityId,
    /// Start of the path.
    pub origin: Vec2Fixed,
    /// Goal of the path.
    pub destination: Vec2Fixed,
}

/// Why the pathfinding service could not produce a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum PathFailure {
    /// No route connects origin and destination.
    #[error("no route between origin and destination")]
    NoRoute,
    /// The service could not process the request.
    #[error("pathfinding service unavailable: {0}")]
    Unavailable(String),
}

/// Completion delivered by the pathfinding service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathResult {
    /// Ticket of the request being answered.
    pub ticket: PathTicket,
    /// Agent that asked for the path.
    pub requester: EntityId,
    /// Ordered waypoints, or the failure.
    pub outcome: Result<Vec<Vec2Fixed>, PathFailure>,
}

impl PathResult {
    /// Successful result for `request`.
    #[must_use]
    pub fn found(request: &PathRequest, waypoints: Vec<Vec2Fixed>) -> Self {
        Self {
            ticket: request.ticket,
            requester: request.requester,
            outcome: Ok(waypoints),
        }
    }

    /// Failed result for `request`.
    #[must_use]
    pub fn failed(request: &PathRequest, failure: PathFailure) -> Self {
        Self {
            ticket: request.ticket,
            requester: request.requester,
            outcome: Err(failure),
        }
    }
}

/// External pathfinding service.
///
/// `submit` must not block: the answer comes back later as a
/// [`PathResult`].
pub trait PathService {
    /// Hand a request to the service.
    fn submit(&mut self, request: PathRequest);
}

/// Collecting requests into a vector lets the host forward them after the
/// tick has finished.
impl PathService for Vec<PathRequest> {
    fn submit(&mut self, request: PathRequest) {
        self.push(request);
    }
}

/// An installed path: waypoints plus the cursor of the next one to reach.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Route {
    waypoints: Vec<Vec2Fixed>,
    cursor: usize,
}

impl Route {
    /// Fresh route starting at its first waypoint.
    #[must_use]
    pub fn new(waypoints: Vec<Vec2Fixed>) -> Self {
        Self {
            waypoints,
            cursor: 0,
        }
    }

    /// All waypoints, in order.
    #[must_use]
    pub fn waypoints(&self) -> &[Vec2Fixed] {
        &self.waypoints
    }

    /// Index of the waypoint currently being approached.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// True when the route holds no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Waypoint currently being approached, if any is left.
    #[must_use]
    pub fn current(&self) -> Option<Vec2Fixed> {
        self.waypoints.get(self.cursor).copied()
    }

    /// `cursor >= len`: every waypoint has been reached.
    #[must_use]
    pub fn reached_end(&self) -> bool {
        self.cursor >= self.waypoints.len()
    }

    /// Move on to the next waypoint. Saturates at the end of the route.
    pub fn advance(&mut self) {
        if !self.reached_end() {
            self.cursor += 1;
        }
    }
}

/// What [`PathRequestClient::complete`] did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCompletion {
    /// A new route replaced the cached one.
    Installed,
    /// The request failed; the cached route is kept.
    Failed,
    /// The result did not answer the pending request and was ignored.
    Stale,
}

/// Per-agent front end to the pathfinding service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PathRequestClient {
    next_ticket: u64,
    pending: Option<PathTicket>,
    route: Option<Route>,
    failures: u32,
}

impl PathRequestClient {
    /// Client with no route and nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a request is outstanding.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Ticket of the outstanding request.
    #[must_use]
    pub const fn pending_ticket(&self) -> Option<PathTicket> {
        self.pending
    }

    /// Most recent successfully installed route.
    #[must_use]
    pub const fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Mutable access for the movement step.
    pub fn route_mut(&mut self) -> Option<&mut Route> {
        self.route.as_mut()
    }

    /// Number of failed requests since creation.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Issue a request unless one is already outstanding.
    ///
    /// Returns the submitted request, or `None` when refused.
    pub fn request(
        &mut self,
        requester: EntityId,
        origin: Vec2Fixed,
        destination: Vec2Fixed,
        service: &mut dyn PathService,
    ) -> Option<PathRequest> {
        if self.pending.is_some() {
            return None;
        }

        let ticket = PathTicket(self.next_ticket);
        self.next_ticket += 1;
        self.pending = Some(ticket);

        let request = PathRequest {
            ticket,
            requester,
            origin,
            destination,
        };
        service.submit(request);
        Some(request)
    }

    /// Apply a result delivered by the service.
    pub fn complete(&mut self, result: PathResult) -> PathCompletion {
        if self.pending != Some(result.ticket) {
            tracing::warn!(
                requester = result.requester,
                ticket = result.ticket.0,
                "Ignoring path result that does not match the pending request"
            );
            return PathCompletion::Stale;
        }
        self.pending = None;

        match result.outcome {
            Ok(waypoints) => {
                tracing::debug!(
                    requester = result.requester,
                    waypoints = waypoints.len(),
                    "Installed new path"
                );
                self.route = Some(Route::new(waypoints));
                PathCompletion::Installed
            }
            Err(failure) => {
                self.failures += 1;
                tracing::debug!(
                    requester = result.requester,
                    %failure,
                    "Path request failed, keeping cached path"
                );
                PathCompletion::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waypoints(points: &[(i32, i32)]) -> Vec<Vec2Fixed> {
        points
            .iter()
            .map(|&(x, y)| Vec2Fixed::from_ints(x, y))
            .collect()
    }

    #[test]
    fn test_second_request_refused_while_pending() {
        let mut client = PathRequestClient::new();
        let mut service: Vec<PathRequest> = Vec::new();

        let first = client.request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(5, 0), &mut service);
        let second = client.request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(6, 0), &mut service);

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(service.len(), 1);
        assert!(client.is_pending());
    }

    #[test]
    fn test_success_installs_route_and_resets_cursor() {
        let mut client = PathRequestClient::new();
        let mut service: Vec<PathRequest> = Vec::new();

        let request = client
            .request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(5, 0), &mut service)
            .unwrap();
        client.complete(PathResult::found(&request, waypoints(&[(1, 0), (5, 0)])));
        client.route_mut().unwrap().advance();
        assert_eq!(client.route().unwrap().cursor(), 1);

        let request = client
            .request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(9, 0), &mut service)
            .unwrap();
        let outcome = client.complete(PathResult::found(&request, waypoints(&[(9, 0)])));

        assert_eq!(outcome, PathCompletion::Installed);
        let route = client.route().unwrap();
        assert_eq!(route.cursor(), 0);
        assert_eq!(route.waypoints(), waypoints(&[(9, 0)]).as_slice());
        assert!(!client.is_pending());
    }

    #[test]
    fn test_failure_keeps_previous_route() {
        let mut client = PathRequestClient::new();
        let mut service: Vec<PathRequest> = Vec::new();

        let request = client
            .request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(5, 0), &mut service)
            .unwrap();
        client.complete(PathResult::found(&request, waypoints(&[(1, 0), (5, 0)])));
        client.route_mut().unwrap().advance();

        let request = client
            .request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(5, 5), &mut service)
            .unwrap();
        let outcome = client.complete(PathResult::failed(&request, PathFailure::NoRoute));

        assert_eq!(outcome, PathCompletion::Failed);
        assert_eq!(client.failures(), 1);
        // Stale-but-usable: same waypoints, same progress
        let route = client.route().unwrap();
        assert_eq!(route.cursor(), 1);
        assert_eq!(route.len(), 2);
        // And the client can ask again
        assert!(!client.is_pending());
    }

    #[test]
    fn test_stale_result_is_ignored() {
        let mut client = PathRequestClient::new();
        let mut service: Vec<PathRequest> = Vec::new();

        let request = client
            .request(1, Vec2Fixed::ZERO, Vec2Fixed::from_ints(5, 0), &mut service)
            .unwrap();
        let mut bogus = PathResult::found(&request, waypoints(&[(3, 3)]));
        bogus.ticket = PathTicket(request.ticket.0 + 10);

        assert_eq!(client.complete(bogus), PathCompletion::Stale);
        assert!(client.is_pending());
        assert!(client.route().is_none());
    }

    #[test]
    fn test_route_cursor_saturates_at_end() {
        let mut route = Route::new(waypoints(&[(1, 1)]));
        assert_eq!(route.current(), Some(Vec2Fixed::from_ints(1, 1)));

        route.advance();
        route.advance();

        assert!(route.reached_end());
        assert_eq!(route.cursor(), 1);
        assert_eq!(route.current(), None);
    }

    #[test]
    fn test_empty_route_has_reached_end() {
        let route = Route::new(Vec::new());
        assert!(route.is_empty());
        assert!(route.reached_end());
    }
}
