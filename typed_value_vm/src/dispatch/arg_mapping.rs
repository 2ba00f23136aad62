//! Binding a raw call-site argument list against one overload's formal
//! parameter list.
//!
//! A `CallArgMapping` lives for exactly one resolution attempt: push the
//! positional and keyword values, freeze with [`finished_pushing`], and
//! read the verdict from [`is_valid`]. A frozen, valid mapping assigns
//! exactly one value to every formal parameter, with excess positional
//! values collected into a star-args tuple and excess named values into a
//! star-kwargs record when the overload declares them.
//!
//! [`finished_pushing`]: CallArgMapping::finished_pushing
//! [`is_valid`]: CallArgMapping::is_valid

use crate::function::{Overload, ParamKind};
use crate::host::{HostValue, TypedValue};
use crate::types::{coerce, typed_storage, TypeTag};

/// The transient mapping of one call attempt onto one overload.
#[derive(Debug)]
pub struct CallArgMapping<'a> {
    overload: &'a Overload,
    pushed_positional: Vec<HostValue>,
    pushed_keyword: Vec<(String, HostValue)>,
    /// One value per formal parameter once frozen.
    single_values: Vec<Option<HostValue>>,
    valid: bool,
    frozen: bool,
}

impl<'a> CallArgMapping<'a> {
    pub fn new(overload: &'a Overload) -> Self {
        Self {
            overload,
            pushed_positional: Vec::new(),
            pushed_keyword: Vec::new(),
            single_values: vec![None; overload.params().len()],
            valid: true,
            frozen: false,
        }
    }

    /// Push the next positional value. The receiver of a bound-method
    /// call is pushed first, before the explicit arguments.
    pub fn push_positional_arg(&mut self, value: HostValue) {
        debug_assert!(!self.frozen, "pushed after finished_pushing");
        self.pushed_positional.push(value);
    }

    pub fn push_keyword_arg(&mut self, name: &str, value: HostValue) {
        debug_assert!(!self.frozen, "pushed after finished_pushing");
        self.pushed_keyword.push((name.to_string(), value));
    }

    /// Freeze the mapping: bind every pushed value to a formal parameter
    /// or mark the mapping invalid.
    pub fn finished_pushing(&mut self) {
        debug_assert!(!self.frozen, "finished_pushing called twice");
        self.frozen = true;

        let params = self.overload.params();
        let mut keyword_consumed = vec![false; self.pushed_keyword.len()];
        let mut next_positional = 0usize;

        for (index, param) in params.iter().enumerate() {
            match param.kind {
                ParamKind::Normal => {
                    if next_positional < self.pushed_positional.len() {
                        // A keyword naming an already-positionally-filled
                        // parameter is a duplicate binding.
                        if self.pushed_keyword.iter().any(|(n, _)| *n == param.name) {
                            self.valid = false;
                            return;
                        }
                        self.single_values[index] =
                            Some(self.pushed_positional[next_positional].clone());
                        next_positional += 1;
                    } else if let Some(found) = self
                        .pushed_keyword
                        .iter()
                        .position(|(n, _)| *n == param.name)
                    {
                        if keyword_consumed[found] {
                            self.valid = false;
                            return;
                        }
                        keyword_consumed[found] = true;
                        self.single_values[index] = Some(self.pushed_keyword[found].1.clone());
                    } else if let Some(default) = &param.default {
                        self.single_values[index] = Some(default.clone());
                    } else {
                        // A required parameter got no value.
                        self.valid = false;
                        return;
                    }
                }
                ParamKind::StarArgs => {
                    let rest: Vec<HostValue> =
                        self.pushed_positional[next_positional..].to_vec();
                    next_positional = self.pushed_positional.len();
                    self.single_values[index] = Some(HostValue::tuple(rest));
                }
                ParamKind::KwArgs => {
                    // Filled below, once every named parameter has had a
                    // chance to consume its keyword.
                }
            }
        }

        // Unconsumed positional values with nowhere to go.
        if next_positional < self.pushed_positional.len() {
            self.valid = false;
            return;
        }

        // Route leftover keywords into the star-kwargs record, or fail.
        let leftovers: Vec<(String, HostValue)> = self
            .pushed_keyword
            .iter()
            .zip(keyword_consumed.iter())
            .filter(|(_, consumed)| !**consumed)
            .map(|((name, value), _)| (name.clone(), value.clone()))
            .collect();

        if let Some(kwargs_index) = params.iter().position(|p| p.kind == ParamKind::KwArgs) {
            self.single_values[kwargs_index] = Some(HostValue::record(leftovers));
        } else if !leftovers.is_empty() {
            self.valid = false;
        }
    }

    /// Does every required parameter hold a value?
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The per-parameter values, in formal order. Meaningful only on a
    /// frozen, valid mapping.
    pub fn single_value_args(&self) -> &[Option<HostValue>] {
        &self.single_values
    }

    /// Convert every bound normal-parameter value through its declared
    /// type filter. A conversion failure invalidates the mapping (it does
    /// not abort resolution; later overloads are still tried).
    pub fn apply_type_coercion(&mut self, explicit: bool) {
        if !self.valid {
            return;
        }
        for (index, param) in self.overload.params().iter().enumerate() {
            if !param.is_normal() {
                continue;
            }
            let Some(filter) = &param.type_filter else {
                continue;
            };
            let Some(value) = &self.single_values[index] else {
                continue;
            };
            match coerce(filter, value, explicit) {
                Ok(converted) => self.single_values[index] = Some(converted),
                Err(_) => {
                    self.valid = false;
                    return;
                }
            }
        }
    }

    /// Rebuild the positional argument list for the interpreted path:
    /// every normal parameter's value in formal order, with star-args
    /// elements spliced back in.
    pub fn build_positional_args(&self) -> Vec<HostValue> {
        let mut args = Vec::new();
        for (index, param) in self.overload.params().iter().enumerate() {
            let Some(value) = &self.single_values[index] else {
                continue;
            };
            match param.kind {
                ParamKind::Normal => args.push(value.clone()),
                ParamKind::StarArgs => {
                    if let HostValue::Tuple(elts) = value {
                        args.extend(elts.iter().cloned());
                    }
                }
                ParamKind::KwArgs => {}
            }
        }
        args
    }

    /// Rebuild the keyword map for the interpreted path: the star-kwargs
    /// record's entries, if the overload declares one.
    pub fn build_keyword_args(&self) -> Vec<(String, HostValue)> {
        for (index, param) in self.overload.params().iter().enumerate() {
            if param.kind == ParamKind::KwArgs {
                if let Some(HostValue::Record(entries)) = &self.single_values[index] {
                    return entries.as_ref().clone();
                }
            }
        }
        Vec::new()
    }

    /// Extract parameter `index` into owned typed storage of exactly
    /// `target` (implicit conversion only). `None` means the
    /// specialization cannot take this call.
    pub fn extract_arg_with_type(&self, index: usize, target: &TypeTag) -> Option<TypedValue> {
        let value = self.single_values.get(index)?.as_ref()?;
        typed_storage(target, value)
    }

    /// The concrete argument values handed to the compilation service as
    /// examples, in formal order.
    pub fn extract_argument_values(&self) -> Vec<HostValue> {
        self.single_values
            .iter()
            .filter_map(|slot| slot.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{InterpretedBody, Overload, Param};

    fn overload(params: Vec<Param>) -> Overload {
        Overload::new(params, None, InterpretedBody::new(|_| Ok(HostValue::None)))
    }

    fn frozen<'a>(
        overload: &'a Overload,
        positional: &[HostValue],
        keyword: &[(&str, HostValue)],
    ) -> CallArgMapping<'a> {
        let mut mapping = CallArgMapping::new(overload);
        for v in positional {
            mapping.push_positional_arg(v.clone());
        }
        for (name, v) in keyword {
            mapping.push_keyword_arg(name, v.clone());
        }
        mapping.finished_pushing();
        mapping
    }

    #[test]
    fn test_positional_fill_left_to_right() {
        let o = overload(vec![Param::new("a"), Param::new("b")]);
        let m = frozen(&o, &[HostValue::Int(1), HostValue::Int(2)], &[]);
        assert!(m.is_valid());
        assert_eq!(m.single_value_args()[0], Some(HostValue::Int(1)));
        assert_eq!(m.single_value_args()[1], Some(HostValue::Int(2)));
    }

    #[test]
    fn test_keyword_binds_unfilled_parameter() {
        let o = overload(vec![Param::new("a"), Param::new("b")]);
        let m = frozen(&o, &[HostValue::Int(1)], &[("b", HostValue::Int(2))]);
        assert!(m.is_valid());
        assert_eq!(m.single_value_args()[1], Some(HostValue::Int(2)));
    }

    #[test]
    fn test_default_fills_unmet_parameter() {
        let o = overload(vec![
            Param::new("a"),
            Param::new("b").with_default(HostValue::Int(9)),
        ]);
        let m = frozen(&o, &[HostValue::Int(1)], &[]);
        assert!(m.is_valid());
        assert_eq!(m.single_value_args()[1], Some(HostValue::Int(9)));
    }

    #[test]
    fn test_missing_required_parameter_invalidates() {
        let o = overload(vec![Param::new("a"), Param::new("b")]);
        let m = frozen(&o, &[HostValue::Int(1)], &[]);
        assert!(!m.is_valid());
    }

    #[test]
    fn test_unknown_keyword_invalidates_without_kwargs_param() {
        let o = overload(vec![Param::new("a")]);
        let m = frozen(
            &o,
            &[HostValue::Int(1)],
            &[("nope", HostValue::Int(2))],
        );
        assert!(!m.is_valid());
    }

    #[test]
    fn test_unknown_keyword_collected_by_kwargs_param() {
        let o = overload(vec![Param::new("a"), Param::kwargs("kw")]);
        let m = frozen(
            &o,
            &[HostValue::Int(1)],
            &[("extra", HostValue::Str("v".into()))],
        );
        assert!(m.is_valid());
        assert_eq!(
            m.single_value_args()[1],
            Some(HostValue::record(vec![(
                "extra".to_string(),
                HostValue::Str("v".into())
            )]))
        );
        assert_eq!(m.build_keyword_args().len(), 1);
    }

    #[test]
    fn test_excess_positional_invalidates_without_star_param() {
        let o = overload(vec![Param::new("a")]);
        let m = frozen(&o, &[HostValue::Int(1), HostValue::Int(2)], &[]);
        assert!(!m.is_valid());
    }

    #[test]
    fn test_excess_positional_collected_by_star_param() {
        let o = overload(vec![Param::new("a"), Param::star("rest")]);
        let m = frozen(
            &o,
            &[HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)],
            &[],
        );
        assert!(m.is_valid());
        assert_eq!(
            m.single_value_args()[1],
            Some(HostValue::tuple(vec![
                HostValue::Int(2),
                HostValue::Int(3)
            ]))
        );
        // The interpreted path sees the star elements spliced back.
        assert_eq!(
            m.build_positional_args(),
            vec![HostValue::Int(1), HostValue::Int(2), HostValue::Int(3)]
        );
    }

    #[test]
    fn test_duplicate_binding_invalidates() {
        let o = overload(vec![Param::new("a")]);
        let m = frozen(&o, &[HostValue::Int(1)], &[("a", HostValue::Int(2))]);
        assert!(!m.is_valid());
    }

    #[test]
    fn test_keyword_only_after_star() {
        let o = overload(vec![
            Param::new("a"),
            Param::star("rest"),
            Param::new("flag").with_default(HostValue::Bool(false)),
        ]);
        let m = frozen(
            &o,
            &[HostValue::Int(1), HostValue::Int(2)],
            &[("flag", HostValue::Bool(true))],
        );
        assert!(m.is_valid());
        assert_eq!(m.single_value_args()[2], Some(HostValue::Bool(true)));
    }

    #[test]
    fn test_coercion_invalidates_on_failure() {
        let o = overload(vec![Param::with_filter("x", TypeTag::I64)]);
        let mut m = frozen(&o, &[HostValue::Str("nope".into())], &[]);
        assert!(m.is_valid());
        m.apply_type_coercion(true);
        assert!(!m.is_valid());
    }

    #[test]
    fn test_coercion_converts_in_place() {
        let o = overload(vec![Param::with_filter("x", TypeTag::I64)]);
        let mut m = frozen(&o, &[HostValue::Float(3.0)], &[]);
        m.apply_type_coercion(true);
        assert!(m.is_valid());
        assert_eq!(m.single_value_args()[0], Some(HostValue::Int(3)));
    }

    #[test]
    fn test_extract_arg_with_type() {
        let o = overload(vec![Param::new("x")]);
        let m = frozen(&o, &[HostValue::Int(5)], &[]);
        assert_eq!(
            m.extract_arg_with_type(0, &TypeTag::I64),
            Some(TypedValue::I64(5))
        );
        assert_eq!(m.extract_arg_with_type(0, &TypeTag::Str), None);
    }
}
