use approx::assert_abs_diff_eq;
use cafebot_core::common::types::{ObstacleFootprint, ObstacleId, Pose, WorldPoint};
use cafebot_core::config::{GridConfig, MotionConfig, ReplanConfig, ReplanMode};
use cafebot_core::control::BlockReason;
use cafebot_core::navigation::grid::{GridBuilder, GridCell};
use cafebot_core::navigation::snapshot::ObstacleStore;
use cafebot_core::perception::{monitor_from_config, ObstacleMonitor};
use cafebot_core::robot::{MotionPort, SensingPort};
use cafebot_core::sim::{cafe_scene, SimRobot, COUNTER_ID, GROUND_ID, ROBOT_ID};
use cafebot_core::{
    CancelToken, NavigationConfig, NavigationOutcome, NavigationRequest, Navigator, RobotError,
};
use pretty_assertions::assert_eq;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

fn config(cells: usize) -> NavigationConfig {
    NavigationConfig {
        grid: GridConfig {
            width: cells,
            height: cells,
            ..GridConfig::default()
        },
        motion: MotionConfig::immediate(),
        ..NavigationConfig::default()
    }
}

fn sim(scene: Vec<ObstacleFootprint>) -> Arc<SimRobot> {
    Arc::new(SimRobot::new(ObstacleStore::new(scene), Pose::default()).unwrap())
}

fn rig(scene: Vec<ObstacleFootprint>, config: &NavigationConfig) -> (Arc<SimRobot>, Navigator) {
    let robot = sim(scene);
    let monitor = monitor_from_config(&config.monitor, robot.clone(), robot.clone());
    let navigator = Navigator::new(config, robot.clone(), robot.clone(), monitor)
        .with_ignored([ROBOT_ID, GROUND_ID]);
    (robot, navigator)
}

fn distance_to(robot: &SimRobot, x: f64, y: f64) -> f64 {
    robot.pose().unwrap().position().distance_to(&WorldPoint::new(x, y))
}

#[derive(Debug)]
struct Clear;

impl ObstacleMonitor for Clear {
    fn blocked(&self, _pose: &Pose) -> bool {
        false
    }

    fn name(&self) -> &str {
        "Clear"
    }

    fn configure(&mut self, _params: &HashMap<String, f64>) -> cafebot_core::Result<()> {
        Ok(())
    }
}

#[test]
fn empty_room_goal_takes_eight_diagonal_steps() {
    let (robot, navigator) = rig(vec![], &config(32));
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(2.0, 2.0)));

    assert_eq!(result.outcome, NavigationOutcome::Reached);
    let attempt = &result.trace.attempts[0];
    assert_eq!(attempt.step_count(), 8);
    for pair in attempt.cells.windows(2) {
        assert_eq!((pair[1].i - pair[0].i, pair[1].j - pair[0].j), (1, 1));
    }
    assert!(distance_to(&robot, 2.0, 2.0) < 1e-4);
    assert!(result.trace.max_step_error() < 1e-9);
}

#[test]
fn goal_on_the_edge_of_a_small_grid_is_invalid() {
    // A 16 x 16 grid of 0.25 m cells spans [-2, 2); (2, 2) is just outside
    let (robot, navigator) = rig(vec![], &config(16));
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(2.0, 2.0)));
    assert_eq!(result.outcome, NavigationOutcome::InvalidGoal);
    assert_eq!(robot.pose().unwrap(), Pose::default());
}

#[test]
fn far_goal_is_invalid_and_far_obstacles_are_harmless() {
    let distant = ObstacleFootprint::around(ObstacleId(40), WorldPoint::new(1e10, 1e10), 1.0, 1.0);
    let (robot, navigator) = rig(vec![distant], &config(32));

    for goal in [(1e10, 0.0), (0.0, -1e10), (f64::MAX, 1.0)] {
        let result = navigator.navigate(&NavigationRequest::to(WorldPoint::from(goal)));
        assert_eq!(result.outcome, NavigationOutcome::InvalidGoal, "goal {:?}", goal);
    }
    assert_eq!(robot.pose().unwrap(), Pose::default());

    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(1.0, 1.0)));
    assert_eq!(result.outcome, NavigationOutcome::Reached);
}

#[test]
fn detours_around_single_obstacle() {
    let obstacle = ObstacleFootprint::around(ObstacleId(20), WorldPoint::new(1.0, 0.0), 0.1, 1.0);
    let config = config(32);
    let (robot, navigator) = rig(vec![obstacle], &config);
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(2.0, 0.0)));

    assert_eq!(result.outcome, NavigationOutcome::Reached);
    let cells = &result.trace.attempts[0].cells;
    assert_eq!(cells.first(), Some(&GridCell::new(16, 16)));
    assert_eq!(cells.last(), Some(&GridCell::new(24, 16)));
    assert!(cells.iter().any(|c| c.j != 16), "path went straight: {:?}", cells);

    let grid = GridBuilder::new(&config.grid)
        .build(&[obstacle], &HashSet::new())
        .unwrap();
    assert!(cells.iter().all(|&c| grid.is_free(c)));
    assert!(distance_to(&robot, 2.0, 0.0) < 1e-4);
}

#[test]
fn ignored_obstacle_still_stops_the_robot() {
    let person = ObstacleFootprint::around(ObstacleId(20), WorldPoint::new(1.0, 0.0), 0.25, 1.7);
    let (robot, navigator) = rig(vec![person], &config(32));

    let request = NavigationRequest::to(WorldPoint::new(2.0, 0.0)).ignoring([ObstacleId(20)]);
    let result = navigator.navigate(&request);
    assert_eq!(result.outcome, NavigationOutcome::ObstacleBlocked);
    assert_eq!(result.trace.block_reason, Some(BlockReason::Sensor));
    assert_eq!(result.trace.correction, None);
    assert_abs_diff_eq!(robot.pose().unwrap().x, 0.375, epsilon = 1e-9);

    // The caller replans with the person back in the grid
    let retry = navigator.navigate(&NavigationRequest::to(WorldPoint::new(2.0, 0.0)));
    assert_eq!(retry.outcome, NavigationOutcome::Reached);
    assert!(distance_to(&robot, 2.0, 0.0) < 1e-4);
}

#[test]
fn goal_inside_counter_has_no_path() {
    let (robot, navigator) = rig(cafe_scene(), &config(64));
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(-6.0, 0.0)));
    assert_eq!(result.outcome, NavigationOutcome::PathNotFound);
    assert_eq!(robot.pose().unwrap(), Pose::default());

    let served = navigator.navigate(
        &NavigationRequest::to(WorldPoint::new(-6.0, 0.0)).ignoring([COUNTER_ID]),
    );
    // Planning ignores the counter but the forward ray does not
    assert_eq!(served.outcome, NavigationOutcome::ObstacleBlocked);
}

#[test]
fn walks_to_the_cafe_counter() {
    let (robot, navigator) = rig(cafe_scene(), &config(64));
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(-5.0, 0.0)));
    assert_eq!(result.outcome, NavigationOutcome::Reached);
    assert!(distance_to(&robot, -5.0, 0.0) < 1e-4);

    let json: serde_json::Value = serde_json::from_str(&result.trace.to_json().unwrap()).unwrap();
    assert_eq!(json["replans"], 0);
    assert!(json["correction"]["applied"].as_bool().unwrap());
}

/// Sensing port that drops a new customer into the room on the n-th query
struct ArrivingCustomer {
    robot: Arc<SimRobot>,
    queries: AtomicUsize,
    arrive_on: usize,
    customer: ObstacleFootprint,
}

impl SensingPort for ArrivingCustomer {
    fn obstacle_footprints(
        &self,
        exclude: &HashSet<ObstacleId>,
    ) -> Result<Vec<ObstacleFootprint>, RobotError> {
        if self.queries.fetch_add(1, Ordering::SeqCst) + 1 == self.arrive_on {
            self.robot.world().upsert(self.customer)?;
        }
        self.robot.obstacle_footprints(exclude)
    }
}

fn replanning_rig(max_replans: usize) -> (Arc<SimRobot>, Navigator) {
    let robot = sim(vec![]);
    let sensing = ArrivingCustomer {
        robot: robot.clone(),
        queries: AtomicUsize::new(0),
        // Query 1 plans, query 3 guards the step onto the third cell
        arrive_on: 3,
        customer: ObstacleFootprint::around(ObstacleId(30), WorldPoint::new(1.625, 0.125), 0.1, 1.7),
    };
    let config = NavigationConfig {
        replan: ReplanConfig {
            mode: ReplanMode::GridOccupancy,
            max_replans,
        },
        ..config(32)
    };
    let navigator = Navigator::new(&config, robot.clone(), Arc::new(sensing), Box::new(Clear));
    (robot, navigator)
}

#[test]
fn grid_occupancy_triggers_replan_from_current_cell() {
    let (robot, navigator) = replanning_rig(10);
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(3.0, 0.0)));

    assert_eq!(result.outcome, NavigationOutcome::Reached);
    assert_eq!(result.trace.replans, 1);
    assert_eq!(result.trace.attempts.len(), 2);
    // The customer pads cells 21..=23, so the robot stopped in cell 20
    assert_eq!(result.trace.attempts[1].start, GridCell::new(20, 16));
    assert!(result.trace.attempts[1].cells.iter().all(|c| c.i < 21 || c.i > 23 || c.j > 17 || c.j < 15));
    assert!(distance_to(&robot, 3.0, 0.0) < 1e-4);
}

#[test]
fn replan_budget_exhaustion_blocks() {
    let (robot, navigator) = replanning_rig(0);
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(3.0, 0.0)));
    assert_eq!(result.outcome, NavigationOutcome::ObstacleBlocked);
    assert_eq!(result.trace.block_reason, Some(BlockReason::GridOccupied));
    assert_abs_diff_eq!(robot.pose().unwrap().x, 1.125, epsilon = 1e-9);
}

/// Holds the first translation until the test releases it
struct GatedRobot {
    inner: Arc<SimRobot>,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl MotionPort for GatedRobot {
    fn pose(&self) -> Result<Pose, RobotError> {
        self.inner.pose()
    }

    fn rotate_by(&self, delta_theta: f64) -> Result<(), RobotError> {
        self.inner.rotate_by(delta_theta)
    }

    fn translate_by(&self, distance: f64) -> Result<(), RobotError> {
        let first = self.entered.lock().unwrap().take();
        if let Some(entered) = first {
            entered.send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        self.inner.translate_by(distance)
    }
}

fn gated_rig() -> (Arc<SimRobot>, Arc<Navigator>, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let robot = sim(vec![]);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gated = GatedRobot {
        inner: robot.clone(),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
    };
    let navigator = Navigator::new(&config(32), Arc::new(gated), robot.clone(), Box::new(Clear));
    (robot, Arc::new(navigator), entered_rx, release_tx)
}

#[test]
fn one_navigation_in_flight_per_robot() {
    let (robot, navigator, entered, release) = gated_rig();
    let worker = {
        let navigator = Arc::clone(&navigator);
        thread::spawn(move || navigator.navigate(&NavigationRequest::to(WorldPoint::new(1.0, 0.0))))
    };

    entered.recv().unwrap();
    assert!(navigator
        .try_navigate(&NavigationRequest::to(WorldPoint::new(-1.0, 0.0)))
        .is_none());
    release.send(()).unwrap();

    assert_eq!(worker.join().unwrap().outcome, NavigationOutcome::Reached);
    let second = navigator
        .try_navigate(&NavigationRequest::to(WorldPoint::new(-1.0, 0.0)))
        .unwrap();
    assert_eq!(second.outcome, NavigationOutcome::Reached);
    assert!(distance_to(&robot, -1.0, 0.0) < 1e-4);
}

#[test]
fn cancellation_stops_between_segments() {
    let (robot, navigator, entered, release) = gated_rig();
    let token = CancelToken::new();
    let worker = {
        let navigator = Arc::clone(&navigator);
        let token = token.clone();
        thread::spawn(move || {
            navigator.navigate_with_cancel(&NavigationRequest::to(WorldPoint::new(2.0, 2.0)), &token)
        })
    };

    entered.recv().unwrap();
    token.cancel();
    release.send(()).unwrap();

    let result = worker.join().unwrap();
    assert_eq!(result.outcome, NavigationOutcome::Cancelled);
    assert_eq!(result.trace.steps.len(), 1);
    assert!(distance_to(&robot, 0.125, 0.125) < 1e-9);
}

#[test]
fn zero_timeout_expires_before_moving() {
    let config = NavigationConfig {
        timeout_ms: Some(0),
        ..config(32)
    };
    let (robot, navigator) = rig(vec![], &config);
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(1.0, 1.0)));
    assert_eq!(result.outcome, NavigationOutcome::TimedOut);
    assert_eq!(robot.pose().unwrap(), Pose::default());
}

#[test]
fn correction_removes_most_of_the_drift() {
    let robot = Arc::new(
        SimRobot::new(ObstacleStore::new(vec![]), Pose::default())
            .unwrap()
            .with_translation_scale(1.05),
    );
    let navigator = Navigator::new(&config(32), robot.clone(), robot.clone(), Box::new(Clear));
    let result = navigator.navigate(&NavigationRequest::to(WorldPoint::new(1.1, -0.6)));

    assert_eq!(result.outcome, NavigationOutcome::Reached);
    assert!(result.trace.max_step_error() > 1e-3);
    let report = result.trace.correction.unwrap();
    assert!(report.applied);
    assert!(report.residual_after < 0.1 * report.residual_before);
}
