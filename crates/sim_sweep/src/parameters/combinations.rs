use super::{Configuration, Declaration, Injection, ParamValue, Setting};

/// How each declaration resolves to a value for a given grid point.
#[derive(Debug, Clone)]
enum Slot {
    /// Index into the swept axes.
    Axis(usize),
    Fixed(ParamValue),
    Derived {
        source: usize,
        factor: f64,
        divisor: f64,
    },
}

#[derive(Debug, Clone)]
struct SlotTemplate {
    name: String,
    injection: Injection,
    recorded: bool,
    slot: Slot,
}

/// Lazy, restartable iterator over the grid of a parameter space.
///
/// Point `i` is decoded as a mixed-radix number over the swept axes with the
/// first declared axis as the most significant digit.
#[derive(Debug, Clone)]
pub struct Configurations {
    templates: Vec<SlotTemplate>,
    axes: Vec<Vec<ParamValue>>,
    next: usize,
    total: usize,
}

impl Configurations {
    pub(super) fn new(declarations: &[Declaration]) -> Self {
        let mut axes = Vec::new();
        let mut templates: Vec<SlotTemplate> = Vec::with_capacity(declarations.len());

        for declaration in declarations {
            let slot = match declaration {
                Declaration::Sweep { values, .. } => {
                    axes.push(values.materialize());
                    Slot::Axis(axes.len() - 1)
                }
                Declaration::Fixed { value, .. } => Slot::Fixed(value.clone()),
                // Resolved below once every source position is known.
                Declaration::Derived { .. } => Slot::Fixed(ParamValue::Int(0)),
            };
            templates.push(SlotTemplate {
                name: declaration.name().to_string(),
                injection: declaration.injection(),
                recorded: declaration.is_recorded(),
                slot,
            });
        }

        for (position, declaration) in declarations.iter().enumerate() {
            if let Declaration::Derived {
                source,
                factor,
                divisor,
                ..
            } = declaration
            {
                if let Some(source) = templates.iter().position(|t| &t.name == source) {
                    templates[position].slot = Slot::Derived {
                        source,
                        factor: *factor,
                        divisor: *divisor,
                    };
                }
            }
        }

        let total = axes.iter().map(Vec::len).product();

        Self {
            templates,
            axes,
            next: 0,
            total,
        }
    }

    /// Number of configurations in the whole grid.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Configuration at grid position `index`, independent of iteration state.
    pub fn at(&self, index: usize) -> Option<Configuration> {
        if index >= self.total {
            return None;
        }

        let mut picks = vec![0usize; self.axes.len()];
        let mut remainder = index;
        for (axis, values) in self.axes.iter().enumerate().rev() {
            picks[axis] = remainder % values.len();
            remainder /= values.len();
        }

        let mut values: Vec<ParamValue> = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            let value = match &template.slot {
                Slot::Axis(axis) => self.axes[*axis][picks[*axis]].clone(),
                Slot::Fixed(value) => value.clone(),
                Slot::Derived { .. } => ParamValue::Int(0),
            };
            values.push(value);
        }
        for (position, template) in self.templates.iter().enumerate() {
            if let Slot::Derived {
                source,
                factor,
                divisor,
            } = template.slot
            {
                let base = values[source].as_f64().unwrap_or(f64::NAN);
                values[position] = ParamValue::Float(base * factor / divisor);
            }
        }

        let settings = self
            .templates
            .iter()
            .zip(values)
            .map(|(template, value)| Setting {
                name: template.name.clone(),
                value,
                injection: template.injection,
                recorded: template.recorded,
            })
            .collect();

        Some(Configuration::new(settings))
    }
}

impl Iterator for Configurations {
    type Item = Configuration;

    fn next(&mut self) -> Option<Self::Item> {
        let configuration = self.at(self.next)?;
        self.next += 1;
        Some(configuration)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Configurations {}
