//! Signal-flow components: sources and arithmetic.
//!
//! Signal components run first each step. A signal component reading a
//! value written by a same-class peer sees the peer's previous-step output;
//! that one-step lag is part of the execution contract, not a bug.

use crate::component::{Component, ComponentBase, CqsType};
use crate::error::Result;
use crate::network::{signal, NodeDataRef};

/// Constant signal source.
pub struct SignalConstant {
    base: ComponentBase,
    y: f64,
    out: Option<NodeDataRef>,
}

impl SignalConstant {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("SignalConstant", CqsType::Signal),
            y: 0.0,
            out: None,
        })
    }
}

impl Component for SignalConstant {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("out", "signal", false)?;
        self.base.register_parameter("y", 0.0, "-", "Constant value");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        self.y = self.base.parameter_value("y")?;
        let out = self
            .base
            .port("out")
            .expect("declared in configure")
            .node_data_ref(signal::VALUE)?;
        out.set(self.y);
        self.out = Some(out);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        if let Some(out) = &self.out {
            out.set(self.y);
        }
    }
}

/// Step signal source: `y0` before `t_step`, `y1` from `t_step` on.
pub struct SignalStep {
    base: ComponentBase,
    y0: f64,
    y1: f64,
    t_step: f64,
    out: Option<NodeDataRef>,
}

impl SignalStep {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("SignalStep", CqsType::Signal),
            y0: 0.0,
            y1: 1.0,
            t_step: 1.0,
            out: None,
        })
    }
}

impl Component for SignalStep {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("out", "signal", false)?;
        self.base.register_parameter("y0", 0.0, "-", "Value before step");
        self.base.register_parameter("y1", 1.0, "-", "Value after step");
        self.base.register_parameter("t_step", 1.0, "s", "Step time");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        self.y0 = self.base.parameter_value("y0")?;
        self.y1 = self.base.parameter_value("y1")?;
        self.t_step = self.base.parameter_value("t_step")?;
        let out = self
            .base
            .port("out")
            .expect("declared in configure")
            .node_data_ref(signal::VALUE)?;
        out.set(self.y0);
        self.out = Some(out);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, time: f64) {
        let y = if time < self.t_step { self.y0 } else { self.y1 };
        if let Some(out) = &self.out {
            out.set(y);
        }
    }
}

/// Signal gain: `out = k * in`.
pub struct SignalGain {
    base: ComponentBase,
    k: f64,
    input: Option<NodeDataRef>,
    out: Option<NodeDataRef>,
}

impl SignalGain {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("SignalGain", CqsType::Signal),
            k: 1.0,
            input: None,
            out: None,
        })
    }
}

impl Component for SignalGain {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("in", "signal", true)?;
        self.base.add_port("out", "signal", false)?;
        self.base.register_parameter("k", 1.0, "-", "Gain factor");
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        self.k = self.base.parameter_value("k")?;
        let input = self
            .base
            .port("in")
            .expect("declared in configure")
            .node_data_ref(signal::VALUE)?;
        let out = self
            .base
            .port("out")
            .expect("declared in configure")
            .node_data_ref(signal::VALUE)?;
        out.set(self.k * input.get());
        self.input = Some(input);
        self.out = Some(out);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        if let (Some(input), Some(out)) = (&self.input, &self.out) {
            out.set(self.k * input.get());
        }
    }
}

/// Signal sum over a multiport: `out = sum(in#i)`.
pub struct SignalSum {
    base: ComponentBase,
    inputs: Vec<NodeDataRef>,
    out: Option<NodeDataRef>,
}

impl SignalSum {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("SignalSum", CqsType::Signal),
            inputs: Vec::new(),
            out: None,
        })
    }
}

impl Component for SignalSum {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_multiport("in", "signal", false)?;
        self.base.add_port("out", "signal", false)?;
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        self.inputs.clear();
        let multiport = self.base.multiport("in").expect("declared in configure");
        for sub in multiport.subports() {
            self.inputs.push(sub.node_data_ref(signal::VALUE)?);
        }
        let out = self
            .base
            .port("out")
            .expect("declared in configure")
            .node_data_ref(signal::VALUE)?;
        out.set(self.inputs.iter().map(NodeDataRef::get).sum());
        self.out = Some(out);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        if let Some(out) = &self.out {
            out.set(self.inputs.iter().map(NodeDataRef::get).sum());
        }
    }

    fn finalize(&mut self) {
        self.inputs.clear();
        self.out = None;
    }
}

/// Signal sink: terminates a signal line and keeps the last seen value.
///
/// Useful as a probe; the node log carries the full series, this component
/// just makes the final value easy to reach from test code.
pub struct SignalSink {
    base: ComponentBase,
    last: f64,
    input: Option<NodeDataRef>,
}

impl SignalSink {
    /// Factory creator function.
    pub fn create() -> Box<dyn Component> {
        Box::new(Self {
            base: ComponentBase::new("SignalSink", CqsType::Signal),
            last: 0.0,
            input: None,
        })
    }

    /// Last value observed on the input.
    pub fn last_value(&self) -> f64 {
        self.last
    }
}

impl Component for SignalSink {
    fn base(&self) -> &ComponentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase {
        &mut self.base
    }

    fn configure(&mut self) -> Result<()> {
        self.base.add_port("in", "signal", true)?;
        Ok(())
    }

    fn initialize(&mut self, _start_time: f64, _stop_time: f64) -> Result<()> {
        let input = self
            .base
            .port("in")
            .expect("declared in configure")
            .node_data_ref(signal::VALUE)?;
        self.last = input.get();
        self.input = Some(input);
        Ok(())
    }

    fn simulate_one_timestep(&mut self, _time: f64) {
        if let Some(input) = &self.input {
            self.last = input.get();
        }
    }
}
