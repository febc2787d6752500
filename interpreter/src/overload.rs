use std::sync::Arc;
use tracing::trace;
use crate::conversion::{cast_number, ConversionService};
use crate::descriptor::ScalarKind;
use crate::error::{ConversionError, MemberKind, OverloadError};
use crate::object::Value;
use crate::types::{TypeHandle, TypeKind};

/// How well one argument fits one parameter. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchKind {
    Exact,
    Close,
    RequiresConversion,
}

#[derive(Debug, Clone)]
pub enum ArgConversion {
    /// Passed through untouched; also covers boxing, since scalars are not boxed.
    Identity,
    Widen(ScalarKind),
    Convert(TypeHandle),
}

/// Parameter list of one candidate.
#[derive(Debug, Clone)]
pub struct Signature {
    pub parameter_types: Vec<TypeHandle>,
    pub varargs: bool,
}

impl Signature {
    pub fn new(parameter_types: Vec<TypeHandle>, varargs: bool) -> Self {
        Signature { parameter_types, varargs }
    }

    fn describe(&self, name: &str) -> String {
        let params: Vec<&str> = self.parameter_types.iter().map(|t| t.name()).collect();
        format!("{name}({})", params.join(", "))
    }
}

/// How to turn the supplied arguments into what the chosen candidate takes.
#[derive(Debug, Clone)]
pub struct ArgumentPlan {
    pub conversions: Vec<ArgConversion>,
    /// Trailing arguments from this index on are packed into an array of the type.
    pub varargs: Option<(usize, TypeHandle)>,
    pub kind: MatchKind,
}

impl ArgumentPlan {
    pub fn apply(&self, service: &dyn ConversionService, args: Vec<Value>) -> Result<Vec<Value>, ConversionError> {
        let mut converted = Vec::with_capacity(args.len());
        for (arg, conversion) in args.into_iter().zip(&self.conversions) {
            converted.push(match conversion {
                ArgConversion::Identity => arg,
                ArgConversion::Widen(kind) => cast_number(&arg, *kind)
                    .ok_or_else(|| ConversionError::unsupported(arg.type_name(), kind.name()))?,
                ArgConversion::Convert(target) => service.convert(arg, target)?,
            });
        }
        if let Some((start, component)) = &self.varargs {
            let trailing = converted.split_off(*start);
            converted.push(Value::array(component.clone(), trailing));
        }
        Ok(converted)
    }

    /// True when applying the plan never changes a value.
    pub fn is_identity(&self) -> bool {
        self.varargs.is_none() && self.conversions.iter().all(|c| matches!(c, ArgConversion::Identity))
    }
}

struct Scored {
    index: usize,
    kind: MatchKind,
    weight: u32,
    plan: ArgumentPlan,
}

fn score_argument(arg: &Value, param: &TypeHandle, service: &dyn ConversionService) -> Option<(MatchKind, u32, ArgConversion)> {
    if arg.is_null() {
        return (!param.is_primitive()).then_some((MatchKind::Exact, 0, ArgConversion::Identity));
    }
    let arg_type = arg.type_handle();
    if Arc::ptr_eq(&arg_type, param) {
        return Some((MatchKind::Exact, 0, ArgConversion::Identity));
    }
    if let TypeKind::Primitive(kind) = param.kind() {
        if arg.scalar_kind() == Some(kind) {
            return Some((MatchKind::Exact, 0, ArgConversion::Identity));
        }
    }
    if let Some(distance) = arg_type.distance_to(param) {
        return Some((MatchKind::Close, distance, ArgConversion::Identity));
    }
    if let (Some(from), Some(to)) = (arg.numeric_kind(), param.scalar_kind()) {
        if from.widens_to(to) {
            return Some((MatchKind::RequiresConversion, 0, ArgConversion::Widen(to)));
        }
    }
    if service.can_convert(&arg_type, param) {
        return Some((MatchKind::RequiresConversion, 0, ArgConversion::Convert(param.clone())));
    }
    None
}

fn score_all(args: &[Value], params: &[TypeHandle], service: &dyn ConversionService) -> Option<(MatchKind, u32, Vec<ArgConversion>)> {
    let mut kind = MatchKind::Exact;
    let mut weight = 0;
    let mut conversions = Vec::with_capacity(args.len());
    for (arg, param) in args.iter().zip(params) {
        let (k, w, c) = score_argument(arg, param, service)?;
        kind = kind.max(k);
        weight += w;
        conversions.push(c);
    }
    Some((kind, weight, conversions))
}

fn match_fixed(index: usize, signature: &Signature, args: &[Value], service: &dyn ConversionService) -> Option<Scored> {
    if signature.parameter_types.len() != args.len() {
        return None;
    }
    let (kind, weight, conversions) = score_all(args, &signature.parameter_types, service)?;
    Some(Scored { index, kind, weight, plan: ArgumentPlan { conversions, varargs: None, kind } })
}

fn match_varargs(index: usize, signature: &Signature, args: &[Value], service: &dyn ConversionService) -> Option<Scored> {
    let (array_type, fixed_params) = signature.parameter_types.split_last()?;
    let component = array_type.element_type()?;
    if args.len() < fixed_params.len() {
        return None;
    }
    // An array already supplied in the varargs position is passed as is.
    if args.len() == signature.parameter_types.len() {
        if let Some(direct) = match_fixed(index, signature, args, service) {
            if direct.kind != MatchKind::RequiresConversion {
                return Some(direct);
            }
        }
    }
    let (leading, trailing) = args.split_at(fixed_params.len());
    let (mut kind, mut weight, mut conversions) = score_all(leading, fixed_params, service)?;
    for arg in trailing {
        let (k, w, c) = score_argument(arg, component, service)?;
        kind = kind.max(k);
        weight += w;
        conversions.push(c);
    }
    let plan = ArgumentPlan { conversions, varargs: Some((fixed_params.len(), component.clone())), kind };
    Some(Scored { index, kind, weight, plan })
}

fn describe_arguments(args: &[Value]) -> String {
    args.iter().map(Value::type_name).collect::<Vec<_>>().join(", ")
}

fn pick(
    kind: MemberKind,
    name: &str,
    candidates: &[Signature],
    args: &[Value],
    mut matches: Vec<Scored>,
) -> Result<(usize, ArgumentPlan), OverloadError> {
    let Some(best_kind) = matches.iter().map(|m| m.kind).min() else {
        return Err(OverloadError::NoMatch { kind, name: name.to_string(), arguments: describe_arguments(args) });
    };
    matches.retain(|m| m.kind == best_kind);
    if best_kind == MatchKind::RequiresConversion && matches.len() > 1 {
        let described: Vec<String> = matches.iter().map(|m| candidates[m.index].describe(name)).collect();
        return Err(OverloadError::Ambiguous {
            kind,
            name: name.to_string(),
            arguments: describe_arguments(args),
            candidates: described.join(", "),
        });
    }
    // min_by_key keeps the first of equal weights, so declaration order breaks ties.
    let chosen = matches
        .into_iter()
        .min_by_key(|m| m.weight)
        .ok_or_else(|| OverloadError::NoMatch { kind, name: name.to_string(), arguments: describe_arguments(args) })?;
    trace!(member = name, candidate = chosen.index, kind = ?chosen.kind, "overload selected");
    Ok((chosen.index, chosen.plan))
}

/// Pick the best candidate for `args`.
///
/// Exact beats close (subtype or boxing) beats conversion; among close matches
/// the smallest total supertype distance wins. Varargs candidates are considered
/// only when no fixed-arity candidate fits. Remaining ties go to the candidate
/// declared first, except between candidates that all need conversions, which
/// is reported as ambiguous.
pub fn resolve(
    kind: MemberKind,
    name: &str,
    candidates: &[Signature],
    args: &[Value],
    service: &dyn ConversionService,
) -> Result<(usize, ArgumentPlan), OverloadError> {
    let fixed: Vec<Scored> = candidates
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.varargs)
        .filter_map(|(i, s)| match_fixed(i, s, args, service))
        .collect();
    if !fixed.is_empty() {
        return pick(kind, name, candidates, args, fixed);
    }
    let varargs: Vec<Scored> = candidates
        .iter()
        .enumerate()
        .filter(|(_, s)| s.varargs)
        .filter_map(|(i, s)| match_varargs(i, s, args, service))
        .collect();
    pick(kind, name, candidates, args, varargs)
}
