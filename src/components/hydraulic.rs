//! Hydraulic components.
//!
//! Flow is positive from P1 toward P2 in two-port components; the flow seen
//! by P1 is `-q`, so the port relations read `p1 = c1 - Zc1*q`,
//! `p2 = c2 + Zc2*q`.

use crate::component::{Component, ComponentBase, CqsType};
use crate::error::{Result, WavesimError};
use crate::network::{hydraulic, signal, NodeDataRef};

/// Ideal pressure source (C-type).
///
/// Writes `c = p`, `Zc = 0` to its hydraulic port; the pressure comes from
/// the optional signal input when connected, otherwise from the `p`
/// parameter.
pub struct PressureSource {
    base: ComponentBase,
    p: f64,
    input: Option<NodeDataRef>,
    wave: Option<NodeDataRef>,
}

impl PressureSource {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("PressureSource", CqsType::C),
            p: 1e5,
            input: None,
            wave: None,
        })
    }
}

impl Component for PressureSource {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("P1", "hydraulic", true)?;
        self.base.add_port("in", "signal", false)?;
        self.base
            .register_parameter("p", 1e5, "Pa", "Source pressure");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        self.p = self.base.parameter_value("p")?;

        let p1 = self.base.port("P1").expect("declared in configure");
        let wave = p1.node_data_ref(hydraulic::WAVE)?;
        wave.set(self.p);
        p1.node_data_ref(hydraulic::IMPEDANCE)?.set(0.0);
        p1.node_data_ref(hydraulic::PRESSURE)?.set(self.p);
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
        let p = self.input.as_ref().map(NodeDataRef::get).unwrap_or(self.p);
        if let Some(wave) = &self.wave {
            wave.set(p);
        }
    }
}

/// Hydraulic volume modeled as a transmission line element (C-type).
///
/// Characteristic impedance `Zc = 2*beta*dt/V` for the two-port split of
/// the volume's capacitance.
pub struct HydraulicVolume {
    base: ComponentBase,
    zc: f64,
    q1: Option<NodeDataRef>,
    c1: Option<NodeDataRef>,
    q2: Option<NodeDataRef>,
    c2: Option<NodeDataRef>,
}

impl HydraulicVolume {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("HydraulicVolume", CqsType::C),
            zc: 0.0,
            q1: None,
            c1: None,
            q2: None,
            c2: None,
        })
    }
}

impl Component for HydraulicVolume {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("P1", "hydraulic", true)?;
        self.base.add_port("P2", "hydraulic", true)?;
        self.base
            .register_parameter("V", 1e-3, "m^3", "Volume");
        self.base
            .register_parameter("beta", 1e9, "Pa", "Bulk modulus");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        let v = self.base.parameter_value("V")?;
        if v <= 0.0 {
            return Err(WavesimError::parameter_out_of_range(
                self.base.name(),
                "V",
                format!("volume must be positive, got {v}"),
            ));
        }
        let beta = self.base.parameter_value("beta")?;
        self.zc = 2.0 * beta * self.base.timestep() / v;

        let p1 = self.base.port("P1").expect("declared in configure");
        let p2 = self.base.port("P2").expect("declared in configure");

        let c1 = p1.node_data_ref(hydraulic::WAVE)?;
        let c2 = p2.node_data_ref(hydraulic::WAVE)?;
        c1.set(p1.read_node_safe(hydraulic::PRESSURE));
        c2.set(p2.read_node_safe(hydraulic::PRESSURE));
        p1.node_data_ref(hydraulic::IMPEDANCE)?.set(self.zc);
        p2.node_data_ref(hydraulic::IMPEDANCE)?.set(self.zc);

        self.q1 = Some(p1.node_data_ref(hydraulic::FLOW)?);
        self.q2 = Some(p2.node_data_ref(hydraulic::FLOW)?);
        self.c1 = Some(c1);
        self.c2 = Some(c2);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        let (Some(q1), Some(q2), Some(c1), Some(c2)) =
            (&self.q1, &self.q2, &self.c1, &self.c2)
        else {
            return;
        };

        let q1_val = q1.get();
        let q2_val = q2.get();
        let c1_val = c1.get();
        let c2_val = c2.get();

        c1.set(c2_val + 2.0 * self.zc * q2_val);
        c2.set(c1_val + 2.0 * self.zc * q1_val);
    }
}

/// Laminar orifice (Q-type).
///
/// The flow relation `q = Kc * (p1 - p2)` combined with the two port
/// relations reduces to one linear equation, so the flow has the closed
/// form `q = Kc*(c1 - c2) / (1 + Kc*(Zc1 + Zc2))` and no Newton iteration
/// is needed.
pub struct LaminarOrifice {
    base: ComponentBase,
    kc: f64,
    p1: Option<HydraulicRefs>,
    p2: Option<HydraulicRefs>,
}

/// Cached slot handles for one hydraulic port.
struct HydraulicRefs {
    q: NodeDataRef,
    p: NodeDataRef,
    c: NodeDataRef,
    zc: NodeDataRef,
}

impl HydraulicRefs {
    fn capture(port: &crate::network::Port) -> Result<Self> {
        Ok(Self {
            q: port.node_data_ref(hydraulic::FLOW)?,
            p: port.node_data_ref(hydraulic::PRESSURE)?,
            c: port.node_data_ref(hydraulic::WAVE)?,
            zc: port.node_data_ref(hydraulic::IMPEDANCE)?,
        })
    }
}

impl LaminarOrifice {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("LaminarOrifice", CqsType::Q),
            kc: 1e-11,
            p1: None,
            p2: None,
        })
    }
}

impl Component for LaminarOrifice {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("P1", "hydraulic", true)?;
        self.base.add_port("P2", "hydraulic", true)?;
        self.base
            .register_parameter("Kc", 1e-11, "m^3/(s Pa)", "Pressure-flow coefficient");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        self.kc = self.base.parameter_value("Kc")?;
        let p1 = HydraulicRefs::capture(self.base.port("P1").expect("declared in configure"))?;
        let p2 = HydraulicRefs::capture(self.base.port("P2").expect("declared in configure"))?;
        if p1.c.get() == 0.0 {
            p1.c.set(p1.p.get());
        }
        if p2.c.get() == 0.0 {
            p2.c.set(p2.p.get());
        }
        self.p1 = Some(p1);
        self.p2 = Some(p2);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        let (Some(p1), Some(p2)) = (&self.p1, &self.p2) else {
            return;
        };

        let c1 = p1.c.get();
        let zc1 = p1.zc.get();
        let c2 = p2.c.get();
        let zc2 = p2.zc.get();

        let q = self.kc * (c1 - c2) / (1.0 + self.kc * (zc1 + zc2));

        p1.q.set(-q);
        p1.p.set(c1 - zc1 * q);
        p2.q.set(q);
        p2.p.set(c2 + zc2 * q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pressure_source_seeds_port() {
        let mut c = PressureSource::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("p", 2e5).unwrap();
        c.initialize(0.0, 1.0).unwrap();

        let p1 = c.base().port("P1").unwrap();
        assert_relative_eq!(p1.read_node_safe(hydraulic::WAVE), 2e5);
        assert_relative_eq!(p1.read_node_safe(hydraulic::IMPEDANCE), 0.0);
    }

    #[test]
    fn test_volume_impedance() {
        let mut c = HydraulicVolume::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("V", 1e-3).unwrap();
        c.base_mut().set_parameter_value("beta", 1e9).unwrap();
        c.base_mut().set_timestep(1e-3);
        c.initialize(0.0, 1.0).unwrap();

        // Zc = 2*beta*dt/V = 2e9*1e-3/1e-3 = 2e9
        let p1 = c.base().port("P1").unwrap();
        assert_relative_eq!(p1.read_node_safe(hydraulic::IMPEDANCE), 2e9);
    }

    #[test]
    fn test_nonpositive_volume_rejected() {
        let mut c = HydraulicVolume::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("V", 0.0).unwrap();
        let err = c.initialize(0.0, 1.0).unwrap_err();
        assert!(matches!(err, WavesimError::ParameterOutOfRange { .. }));
    }

    #[test]
    fn test_orifice_flow_matches_closed_form() {
        let mut c = LaminarOrifice::create();
        c.configure().unwrap();
        c.base_mut().set_parameter_value("Kc", 1e-9).unwrap();

        let p1 = c.base().port("P1").unwrap();
        let p2 = c.base().port("P2").unwrap();
        p1.set_start_value(hydraulic::WAVE, 2e5);
        p2.set_start_value(hydraulic::WAVE, 1e5);
        c.initialize(0.0, 1.0).unwrap();
        c.simulate_one_timestep(1e-3);

        // Zero impedance on both sides: q = Kc*(c1 - c2)
        let p2 = c.base().port("P2").unwrap();
        assert_relative_eq!(p2.read_node_safe(hydraulic::FLOW), 1e-4, epsilon = 1e-12);
        assert_relative_eq!(p2.read_node_safe(hydraulic::PRESSURE), 1e5);
        let p1 = c.base().port("P1").unwrap();
        assert_relative_eq!(p1.read_node_safe(hydraulic::PRESSURE), 2e5);
    }
}
