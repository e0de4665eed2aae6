//! Ball stepping that drives the physics events of a session.

use driftlog_common::EventKind;
use rand::Rng;

pub const BALL_DIAMETER: f64 = 20.0;
pub const BALL_SPEED: f64 = 3.5;

/// How far past the right edge an exited ball is parked.
const EXIT_OVERSHOOT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub width: f64,
    pub height: f64,
}

impl Field {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_playable(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ball {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

/// What one tick produced: the events to log, and whether the ball left the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub events: Vec<(EventKind, String)>,
    pub exited: bool,
}

impl Ball {
    /// Back to the top-left corner, at rest.
    pub fn reset(&mut self) {
        *self = Ball::default();
    }

    /// Set the velocity from a launch angle in degrees, measured downward from the x axis.
    pub fn launch(&mut self, angle_deg: f64) {
        let angle = angle_deg.to_radians();
        self.vx = angle.cos() * BALL_SPEED;
        self.vy = angle.sin() * BALL_SPEED;
    }

    /// Launch at a uniformly random angle between 20° and 70°.
    pub fn launch_random<R: Rng>(&mut self, rng: &mut R) {
        self.launch(rng.random_range(20.0..70.0));
    }

    /// Advance one tick. Wall hits are reported before the exit check, so a
    /// tick can yield a hit followed by the exit.
    pub fn step(&mut self, field: &Field) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        let nx = self.x + self.vx;
        let mut ny = self.y + self.vy;

        if ny <= 0.0 {
            ny = 0.0;
            self.vy = self.vy.abs();
            outcome.events.push((EventKind::WallHit, "top".to_string()));
        }
        let floor = field.height - BALL_DIAMETER;
        if ny >= floor {
            ny = floor;
            self.vy = -self.vy.abs();
            outcome
                .events
                .push((EventKind::WallHit, "bottom".to_string()));
        }
        if nx >= field.width - BALL_DIAMETER {
            self.x = field.width + EXIT_OVERSHOOT;
            outcome.exited = true;
            outcome
                .events
                .push((EventKind::Exit, "right wall pass".to_string()));
            return outcome;
        }

        self.x = nx;
        self.y = ny;
        outcome.events.push((
            EventKind::PhysicsStep,
            format!("x={:.1}, y={:.1}", nx, ny),
        ));
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_until_exit(ball: &mut Ball, field: &Field) -> Vec<(EventKind, String)> {
        let mut all = Vec::new();
        for _ in 0..10_000 {
            let outcome = ball.step(field);
            all.extend(outcome.events);
            if outcome.exited {
                return all;
            }
        }
        panic!("ball never left the field");
    }

    #[test]
    fn plain_step_moves_and_reports_position() {
        let mut ball = Ball {
            x: 10.0,
            y: 10.0,
            vx: 2.0,
            vy: 1.0,
        };
        let outcome = ball.step(&Field::new(400.0, 200.0));
        assert!(!outcome.exited);
        assert_eq!(
            outcome.events,
            vec![(EventKind::PhysicsStep, "x=12.0, y=11.0".to_string())]
        );
        assert_eq!((ball.x, ball.y), (12.0, 11.0));
    }

    #[test]
    fn bottom_wall_reflects_and_clamps() {
        let mut ball = Ball {
            x: 0.0,
            y: 178.0,
            vx: 1.0,
            vy: 3.0,
        };
        let outcome = ball.step(&Field::new(400.0, 200.0));
        assert_eq!(outcome.events[0], (EventKind::WallHit, "bottom".to_string()));
        assert_eq!(ball.y, 180.0);
        assert!(ball.vy < 0.0);
    }

    #[test]
    fn top_wall_reflects() {
        let mut ball = Ball {
            x: 0.0,
            y: 1.0,
            vx: 1.0,
            vy: -3.0,
        };
        let outcome = ball.step(&Field::new(400.0, 200.0));
        assert_eq!(outcome.events[0], (EventKind::WallHit, "top".to_string()));
        assert_eq!(ball.y, 0.0);
        assert!(ball.vy > 0.0);
    }

    #[test]
    fn crossing_the_right_edge_exits_once() {
        let field = Field::new(100.0, 60.0);
        let mut ball = Ball::default();
        ball.launch(45.0);
        let events = run_until_exit(&mut ball, &field);

        let exits = events.iter().filter(|(k, _)| *k == EventKind::Exit).count();
        assert_eq!(exits, 1);
        assert_eq!(events.last().unwrap().0, EventKind::Exit);
        assert!(events.iter().any(|(k, _)| *k == EventKind::WallHit));
        assert_eq!(ball.x, 105.0);
    }

    #[test]
    fn random_launch_stays_in_the_downward_cone() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let mut ball = Ball::default();
            ball.launch_random(&mut rng);
            assert!(ball.vx > 0.0 && ball.vy > 0.0);
            let speed = (ball.vx * ball.vx + ball.vy * ball.vy).sqrt();
            assert!((speed - BALL_SPEED).abs() < 1e-9);
            assert!(ball.vy / ball.vx > 20f64.to_radians().tan() - 1e-9);
        }
    }

    #[test]
    fn empty_field_is_not_playable() {
        assert!(!Field::new(0.0, 200.0).is_playable());
        assert!(Field::new(1.0, 1.0).is_playable());
    }
}
