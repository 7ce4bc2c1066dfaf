//! Control module: closed-loop path execution and goal correction
pub mod cancel;
pub mod correction;
pub mod executor;

pub use self::cancel::{CancelToken, Interrupt, Interruption};
pub use self::correction::{CorrectionReport, GoalCorrector};
pub use self::executor::{BlockReason, ExecutedStep, ExecutionOutcome, MotionExecutor};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::common::types::Pose;
    use crate::error::RobotError;
    use crate::perception::ObstacleMonitor;
    use crate::robot::MotionPort;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Exact kinematic robot that counts primitives
    pub struct RecordingRobot {
        pose: Mutex<Pose>,
        rotations: AtomicUsize,
        translations: AtomicUsize,
        fail_translation: bool,
    }

    impl RecordingRobot {
        pub fn at(pose: Pose) -> Self {
            RecordingRobot {
                pose: Mutex::new(pose),
                rotations: AtomicUsize::new(0),
                translations: AtomicUsize::new(0),
                fail_translation: false,
            }
        }

        pub fn failing_translation(mut self) -> Self {
            self.fail_translation = true;
            self
        }

        pub fn rotations(&self) -> usize {
            self.rotations.load(Ordering::SeqCst)
        }

        pub fn translations(&self) -> usize {
            self.translations.load(Ordering::SeqCst)
        }
    }

    impl MotionPort for RecordingRobot {
        fn pose(&self) -> Result<Pose, RobotError> {
            Ok(*self.pose.lock().unwrap())
        }

        fn rotate_by(&self, delta_theta: f64) -> Result<(), RobotError> {
            self.rotations.fetch_add(1, Ordering::SeqCst);
            self.pose.lock().unwrap().theta += delta_theta;
            Ok(())
        }

        fn translate_by(&self, distance: f64) -> Result<(), RobotError> {
            if self.fail_translation {
                return Err(RobotError::Motion("wheels stalled".to_string()));
            }
            self.translations.fetch_add(1, Ordering::SeqCst);
            let mut pose = self.pose.lock().unwrap();
            pose.x += distance * pose.theta.cos();
            pose.y += distance * pose.theta.sin();
            Ok(())
        }
    }

    /// Reports blocked from the n-th call (0-based) onwards
    #[derive(Debug)]
    pub struct ScriptedMonitor {
        calls: AtomicUsize,
        blocked_from: Option<usize>,
    }

    impl ScriptedMonitor {
        pub fn never() -> Self {
            ScriptedMonitor {
                calls: AtomicUsize::new(0),
                blocked_from: None,
            }
        }

        pub fn blocked_from_call(n: usize) -> Self {
            ScriptedMonitor {
                calls: AtomicUsize::new(0),
                blocked_from: Some(n),
            }
        }
    }

    impl ObstacleMonitor for ScriptedMonitor {
        fn blocked(&self, _pose: &Pose) -> bool {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.blocked_from.is_some_and(|n| call >= n)
        }

        fn name(&self) -> &str {
            "ScriptedMonitor"
        }

        fn configure(&mut self, _params: &HashMap<String, f64>) -> crate::error::Result<()> {
            Ok(())
        }
    }
}
