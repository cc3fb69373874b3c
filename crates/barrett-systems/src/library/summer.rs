use crate::error::SystemError;
use crate::port::{Input, Output};
use crate::system::{CycleContext, Node, System};

/// `N` 路输入的带符号求和
///
/// 极性字符串每个字符对应一路输入：`'+'` 加，`'-'` 减。
pub struct Summer<const N: usize> {
    pub inputs: [Input<f64>; N],
    pub output: Output<f64>,
    negate: [bool; N],
}

impl<const N: usize> Summer<N> {
    /// # 错误
    ///
    /// 极性字符串长度不是 `N`，或含有 `+`/`-` 以外的字符。
    pub fn new(polarity: &str) -> Result<Node<Self>, SystemError> {
        let negate = parse_polarity::<N>(polarity)?;
        Ok(Node::new("summer", |ports| Self {
            inputs: std::array::from_fn(|_| ports.add_input()),
            output: ports.add_output(),
            negate,
        }))
    }

    /// 全部为加
    pub fn all_positive() -> Node<Self> {
        Node::new("summer", |ports| Self {
            inputs: std::array::from_fn(|_| ports.add_input()),
            output: ports.add_output(),
            negate: [false; N],
        })
    }

    pub fn input(&self, index: usize) -> &Input<f64> {
        &self.inputs[index]
    }
}

fn parse_polarity<const N: usize>(polarity: &str) -> Result<[bool; N], SystemError> {
    let signs: Vec<char> = polarity.chars().collect();
    if signs.len() != N {
        return Err(SystemError::InvalidArgument(format!(
            "polarity \"{}\" has {} signs, expected {}",
            polarity,
            signs.len(),
            N
        )));
    }
    let mut negate = [false; N];
    for (slot, sign) in negate.iter_mut().zip(signs) {
        *slot = match sign {
            '+' => false,
            '-' => true,
            other => {
                return Err(SystemError::InvalidArgument(format!(
                    "invalid polarity sign '{}'",
                    other
                )));
            },
        };
    }
    Ok(negate)
}

impl<const N: usize> System for Summer<N> {
    fn operate(&self, _ctx: &CycleContext) -> Result<(), SystemError> {
        let mut sum = 0.0;
        for (input, &negate) in self.inputs.iter().zip(&self.negate) {
            let value = input.get()?;
            if negate {
                sum -= value;
            } else {
                sum += value;
            }
        }
        self.output.set_value(sum);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Constant;
    use crate::{ExecutionManager, ManualExecutionManager, connect};
    use proptest::prelude::*;

    #[test]
    fn test_parse_polarity() {
        assert_eq!(parse_polarity::<3>("+-+").unwrap(), [false, true, false]);
        assert!(parse_polarity::<2>("+").is_err());
        assert!(parse_polarity::<2>("+*").is_err());
    }

    #[test]
    fn test_missing_input_makes_output_undefined() {
        let em = ManualExecutionManager::with_period(0.002);
        let summer = Summer::<2>::new("+-").unwrap();
        let a = Constant::new(1.0);
        connect(&a.output, summer.input(0)).unwrap();
        em.start_managing(&summer);

        em.run_execution_cycle().unwrap();
        assert!(!summer.output.is_defined());
    }

    proptest! {
        #[test]
        fn prop_signed_sum(a in -1e6f64..1e6, b in -1e6f64..1e6, c in -1e6f64..1e6) {
            let em = ManualExecutionManager::with_period(0.002);
            let summer = Summer::<3>::new("+-+").unwrap();
            let sources = [Constant::new(a), Constant::new(b), Constant::new(c)];
            for (source, input) in sources.iter().zip(&summer.inputs) {
                connect(&source.output, input).unwrap();
            }
            em.start_managing(&summer);
            em.run_execution_cycle().unwrap();
            let expected = a - b + c;
            prop_assert!((summer.output.value().unwrap() - expected).abs() <= 1e-9 * (1.0 + expected.abs()));
        }
    }
}
