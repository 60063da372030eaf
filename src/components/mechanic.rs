//! Translational mechanic components.
//!
//! The C-type components here produce the wave-variable/impedance pair for
//! their side of a coupling; the Q-type mass consumes both pairs and solves
//! its force balance with the fixed-iteration Newton solver.
//!
//! Sign convention for the mass: positive velocity moves from P1 toward P2.
//! The velocity seen by P1 is therefore `-v`, and the port relations read
//! `f1 = c1 - Zc1*v`, `f2 = c2 + Zc2*v`.

use crate::component::{Component, ComponentBase, CqsType};
use crate::error::{Result, WavesimError};
use crate::network::{mechanic, signal, NodeDataRef};
use crate::solver::{DelayBuffer, Limiter, NewtonSolver};

/// Penalty stiffness applied when the mass position crosses a limit.
/// Large enough that limit violation stays in the micrometer range for
/// ordinary loads, small enough to keep the Jacobian well-conditioned.
const CONTACT_STIFFNESS: f64 = 1e9;

/// Ideal force source (C-type).
///
/// Writes `c = F`, `Zc = 0` to its mechanic port. The force comes from the
/// optional signal input when connected, otherwise from the `f` parameter.
pub struct ForceSource {
    base: ComponentBase,
    f: f64,
    input: Option<NodeDataRef>,
    wave: Option<NodeDataRef>,
}

impl ForceSource {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("ForceSource", CqsType::C),
            f: 0.0,
            input: None,
            wave: None,
        })
    }
}

impl Component for ForceSource {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("P1", "mechanic", true)?;
        self.base.add_port("in", "signal", false)?;
        self.base.register_parameter("f", 0.0, "N", "Source force");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        self.f = self.base.parameter_value("f")?;

        let p1 = self.base.port("P1").expect("declared in configure");
        let wave = p1.node_data_ref(mechanic::WAVE)?;
        let impedance = p1.node_data_ref(mechanic::IMPEDANCE)?;
        wave.set(self.f);
        impedance.set(0.0);
        self.wave = Some(wave);

        let in_port = self.base.port("in").expect("declared in configure");
        self.input = if in_port.is_connected() {
            Some(in_port.node_data_ref(signal::VALUE)?)
        } else {
            None
        };
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        let f = self.input.as_ref().map(NodeDataRef::get).unwrap_or(self.f);
        if let Some(wave) = &self.wave {
            wave.set(f);
        }
    }
}

/// Translational spring modeled as a transmission line element (C-type).
///
/// Characteristic impedance `Zc = k * dt`; each step the outgoing wave on
/// one side is the incoming wave plus twice the impedance times the flow on
/// the other side.
pub struct TranslationalSpring {
    base: ComponentBase,
    zc: f64,
    v1: Option<NodeDataRef>,
    c1: Option<NodeDataRef>,
    v2: Option<NodeDataRef>,
    c2: Option<NodeDataRef>,
}

impl TranslationalSpring {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("TranslationalSpring", CqsType::C),
            zc: 0.0,
            v1: None,
            c1: None,
            v2: None,
            c2: None,
        })
    }
}

impl Component for TranslationalSpring {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("P1", "mechanic", true)?;
        self.base.add_port("P2", "mechanic", true)?;
        self.base
            .register_parameter("k", 100.0, "N/m", "Spring stiffness");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        let k = self.base.parameter_value("k")?;
        self.zc = k * self.base.timestep();

        let p1 = self.base.port("P1").expect("declared in configure");
        let p2 = self.base.port("P2").expect("declared in configure");

        let c1 = p1.node_data_ref(mechanic::WAVE)?;
        let c2 = p2.node_data_ref(mechanic::WAVE)?;

        // Seed waves from the start forces so the first step is consistent
        c1.set(p1.read_node_safe(mechanic::FORCE));
        c2.set(p2.read_node_safe(mechanic::FORCE));
        p1.node_data_ref(mechanic::IMPEDANCE)?.set(self.zc);
        p2.node_data_ref(mechanic::IMPEDANCE)?.set(self.zc);

        self.v1 = Some(p1.node_data_ref(mechanic::VELOCITY)?);
        self.v2 = Some(p2.node_data_ref(mechanic::VELOCITY)?);
        self.c1 = Some(c1);
        self.c2 = Some(c2);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        let (Some(v1), Some(v2), Some(c1), Some(c2)) =
            (&self.v1, &self.v2, &self.c1, &self.c2)
        else {
            return;
        };

        // Frozen reads at the top
        let v1_val = v1.get();
        let v2_val = v2.get();
        let c1_val = c1.get();
        let c2_val = c2.get();

        // Writes at the bottom
        c1.set(c2_val + 2.0 * self.zc * v2_val);
        c2.set(c1_val + 2.0 * self.zc * v1_val);
    }
}

/// Translational mass with viscous damping and optional position limits
/// (Q-type).
///
/// Solves, per step, the two-unknown system
///
/// ```text
/// m*(v - v_prev)/dt + (Zc1 + Zc2 + b)*v + c2 - c1 + F_limit(x) = 0
/// (x - x_prev)/dt - v = 0
/// ```
///
/// with the fixed-iteration Newton solver. `F_limit` is a stiff penalty
/// force outside `[x_min, x_max]`; its one-sided derivative enters the
/// Jacobian through the limiter, so the clamp never divides by zero.
pub struct TranslationalMass {
    base: ComponentBase,
    m: f64,
    b: f64,
    limiter: Limiter,
    solver: NewtonSolver,
    /// Unknown vector [v, x], warm-started from the previous step
    state: [f64; 2],
    v_mem: DelayBuffer,
    x_mem: DelayBuffer,
    limit_warned: bool,
    p1: Option<MechanicRefs>,
    p2: Option<MechanicRefs>,
}

/// Cached slot handles for one mechanic port.
struct MechanicRefs {
    v: NodeDataRef,
    f: NodeDataRef,
    x: NodeDataRef,
    c: NodeDataRef,
    zc: NodeDataRef,
}

impl MechanicRefs {
    fn capture(port: &crate::network::Port) -> Result<Self> {
        Ok(Self {
            v: port.node_data_ref(mechanic::VELOCITY)?,
            f: port.node_data_ref(mechanic::FORCE)?,
            x: port.node_data_ref(mechanic::POSITION)?,
            c: port.node_data_ref(mechanic::WAVE)?,
            zc: port.node_data_ref(mechanic::IMPEDANCE)?,
        })
    }
}

impl TranslationalMass {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("TranslationalMass", CqsType::Q),
            m: 1.0,
            b: 0.0,
            limiter: Limiter::new(f64::NEG_INFINITY, f64::INFINITY),
            solver: NewtonSolver::new(2),
            state: [0.0; 2],
            v_mem: DelayBuffer::new(1, 0.0),
            x_mem: DelayBuffer::new(1, 0.0),
            limit_warned: false,
            p1: None,
            p2: None,
        })
    }
}

impl Component for TranslationalMass {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("P1", "mechanic", true)?;
        self.base.add_port("P2", "mechanic", true)?;
        self.base.register_parameter("m", 1.0, "kg", "Mass");
        self.base
            .register_parameter("b", 0.0, "N s/m", "Viscous damping");
        self.base
            .register_parameter("x_min", -1e300, "m", "Lower position limit");
        self.base
            .register_parameter("x_max", 1e300, "m", "Upper position limit");
        self.base
            .register_parameter("n_iter", 2.0, "-", "Newton iterations per step");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        self.m = self.base.parameter_value("m")?;
        if self.m <= 0.0 {
            return Err(WavesimError::parameter_out_of_range(
                self.base.name(),
                "m",
                format!("mass must be positive, got {}", self.m),
            ));
        }
        self.b = self.base.parameter_value("b")?;
        self.limiter = Limiter::new(
            self.base.parameter_value("x_min")?,
            self.base.parameter_value("x_max")?,
        );
        self.solver
            .set_iterations(self.base.parameter_value("n_iter")? as usize);
        self.limit_warned = false;

        let p1 = MechanicRefs::capture(self.base.port("P1").expect("declared in configure"))?;
        let p2 = MechanicRefs::capture(self.base.port("P2").expect("declared in configure"))?;

        // Start-up equations: seed state and history from the start values,
        // and make the coupling seeds consistent with the start forces.
        let v = p2.v.get();
        let x = p2.x.get();
        if p1.c.get() == 0.0 {
            p1.c.set(p1.f.get() + p1.zc.get() * -v);
        }
        if p2.c.get() == 0.0 {
            p2.c.set(p2.f.get() + p2.zc.get() * v);
        }
        self.state = [v, x];
        self.v_mem.fill(v);
        self.x_mem.fill(x);

        p1.v.set(-v);
        p1.x.set(-x);
        self.p1 = Some(p1);
        self.p2 = Some(p2);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        let (Some(p1), Some(p2)) = (&self.p1, &self.p2) else {
            return;
        };

        // 1. Frozen inputs: coupling pairs from the C side, history from
        //    the delay buffers.
        let c1 = p1.c.get();
        let zc1 = p1.zc.get();
        let c2 = p2.c.get();
        let zc2 = p2.zc.get();
        let v_prev = self.v_mem.oldest();
        let x_prev = self.x_mem.oldest();

        let dt = self.base.timestep();
        let m = self.m;
        let b = self.b;
        let lim = self.limiter;

        // 2.-3. Warm-started fixed-iteration Newton solve
        let report = self.solver.solve(&mut self.state, |s, r, j| {
            let v = s[0];
            let x = s[1];
            let f_limit = CONTACT_STIFFNESS * (x - lim.value(x));
            r[0] = m * (v - v_prev) / dt + (zc1 + zc2 + b) * v + c2 - c1 + f_limit;
            r[1] = (x - x_prev) / dt - v;
            j.set(0, 0, m / dt + zc1 + zc2 + b);
            j.set(0, 1, CONTACT_STIFFNESS * (1.0 - lim.derivative(x)));
            j.set(1, 0, -1.0);
            j.set(1, 1, 1.0 / dt);
        });

        if report.had_singularity() {
            self.base.hub().warning(
                "SingularJacobian",
                format!(
                    "'{}': damped {} iteration(s) with a singular Jacobian",
                    self.base.name(),
                    report.singular_iterations
                ),
            );
        }

        let v = self.state[0];
        let x = self.state[1];
        if self.limiter.is_saturated(x) && !self.limit_warned {
            self.limit_warned = true;
            self.base.hub().warning(
                "StateClamped",
                format!("'{}': position reached a limit", self.base.name()),
            );
        }

        // 4. Derived outputs back to the node slots
        p1.v.set(-v);
        p1.x.set(-x);
        p1.f.set(c1 - zc1 * v);
        p2.v.set(v);
        p2.x.set(x);
        p2.f.set(c2 + zc2 * v);

        // 5. History for the next step
        self.v_mem.update(v);
        self.x_mem.update(x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_spring_writes_impedance_at_init() {
        let mut c = TranslationalSpring::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("k", 1000.0).unwrap();
        c.base_mut().set_timestep(1e-3);
        c.initialize(0.0, 1.0).unwrap();

        let p1 = c.base().port("P1").unwrap();
        assert_relative_eq!(p1.read_node_safe(mechanic::IMPEDANCE), 1.0);
    }

    #[test]
    fn test_mass_stays_at_rest_without_forcing() {
        let mut c = TranslationalMass::create();
        c.configure().unwrap();
        c.base_mut().set_timestep(1e-3);
        c.initialize(0.0, 1.0).unwrap();

        for step in 1..=1000 {
            c.simulate_one_timestep(step as f64 * 1e-3);
        }

        let p2 = c.base().port("P2").unwrap();
        assert!(p2.read_node_safe(mechanic::VELOCITY).abs() < 1e-12);
        assert!(p2.read_node_safe(mechanic::POSITION).abs() < 1e-12);
    }

    #[test]
    fn test_mass_accelerates_under_constant_force() {
        let mut c = TranslationalMass::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("m", 2.0).unwrap();
        c.base_mut().set_timestep(1e-3);

        // Constant 10 N wave on P1 with zero impedance, like an ideal source
        c.base()
            .port("P1")
            .unwrap()
            .set_start_value(mechanic::WAVE, 10.0);
        c.initialize(0.0, 1.0).unwrap();

        let steps = 1000;
        for step in 1..=steps {
            c.simulate_one_timestep(step as f64 * 1e-3);
        }

        // v = F*t/m after 1 s
        let p2 = c.base().port("P2").unwrap();
        assert_relative_eq!(
            p2.read_node_safe(mechanic::VELOCITY),
            5.0,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_mass_respects_position_limit() {
        let mut c = TranslationalMass::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("x_max", 0.01).unwrap();
        c.base_mut().set_timestep(1e-3);
        c.base()
            .port("P1")
            .unwrap()
            .set_start_value(mechanic::WAVE, 100.0);
        c.initialize(0.0, 1.0).unwrap();

        for step in 1..=2000 {
            c.simulate_one_timestep(step as f64 * 1e-3);
        }

        let x = c.base().port("P2").unwrap().read_node_safe(mechanic::POSITION);
        // Penalty compliance allows a tiny overshoot, nothing more
        assert!(x <= 0.01 + 1e-6, "position {x} exceeded the limit");
    }

    #[test]
    fn test_nonpositive_mass_rejected() {
        let mut c = TranslationalMass::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("m", 0.0).unwrap();
        let err = c.initialize(0.0, 1.0).unwrap_err();
        assert!(matches!(err, WavesimError::ParameterOutOfRange { .. }));
    }

    #[test]
    fn test_force_source_writes_wave() {
        let mut c = ForceSource::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("f", 7.0).unwrap();
        c.initialize(0.0, 1.0).unwrap();
        c.simulate_one_timestep(1e-3);

        let p1 = c.base().port("P1").unwrap();
        assert_relative_eq!(p1.read_node_safe(mechanic::WAVE), 7.0);
        assert_relative_eq!(p1.read_node_safe(mechanic::IMPEDANCE), 0.0);
    }
}
