//! FILENAME: engine/src/functions.rs
//! PURPOSE: The function registry: uppercase name -> parameter descriptor
//! and callable (§4.4, §9's "reimplement as a function registry" note).
//! CONTEXT: Resolving by reflection over a static class (as the source
//! does) has no Rust equivalent worth having — a `HashMap` keyed by name is
//! simpler and the arity check is explicit instead of inferred from method
//! signatures.

use crate::ast_ops::CalcContext;
use crate::error::EvalError;
use crate::format::Format;
use crate::serial_date;
use parser::Variant;
use std::collections::HashMap;

pub type FunctionCallable = fn(&[Variant], &mut CalcContext) -> Result<Variant, EvalError>;

#[derive(Clone, Copy)]
pub struct FunctionDescriptor {
    pub min_args: usize,
    /// `None` means the last parameter is variadic (capped at 255 per §4.2).
    pub max_args: Option<usize>,
    pub call: FunctionCallable,
}

pub struct FunctionRegistry {
    functions: HashMap<&'static str, FunctionDescriptor>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut functions = HashMap::new();
        macro_rules! reg {
            ($name:literal, $min:expr, $max:expr, $call:expr) => {
                functions.insert($name, FunctionDescriptor { min_args: $min, max_args: $max, call: $call });
            };
        }

        reg!("SUM", 0, None, sum);
        reg!("AVERAGE", 1, None, average);
        reg!("MIN", 1, None, min_fn);
        reg!("MAX", 1, None, max_fn);
        reg!("COUNT", 0, None, count);
        reg!("COUNTA", 0, None, counta);
        reg!("IF", 2, Some(3), if_fn);
        reg!("AND", 1, None, and_fn);
        reg!("OR", 1, None, or_fn);
        reg!("NOT", 1, Some(1), not_fn);
        reg!("ABS", 1, Some(1), abs_fn);
        reg!("ROUND", 2, Some(2), round_fn);
        reg!("FLOOR", 1, Some(1), floor_fn);
        reg!("CEILING", 1, Some(1), ceiling_fn);
        reg!("SQRT", 1, Some(1), sqrt_fn);
        reg!("POWER", 2, Some(2), power_fn);
        reg!("MOD", 2, Some(2), mod_fn);
        reg!("INT", 1, Some(1), int_fn);
        reg!("SIGN", 1, Some(1), sign_fn);
        reg!("LEN", 1, Some(1), len_fn);
        reg!("UPPER", 1, Some(1), upper_fn);
        reg!("LOWER", 1, Some(1), lower_fn);
        reg!("TRIM", 1, Some(1), trim_fn);
        reg!("LEFT", 1, Some(2), left_fn);
        reg!("RIGHT", 1, Some(2), right_fn);
        reg!("MID", 3, Some(3), mid_fn);
        reg!("REPT", 2, Some(2), rept_fn);
        reg!("ISNUMBER", 1, Some(1), isnumber_fn);
        reg!("ISTEXT", 1, Some(1), istext_fn);
        reg!("ISBLANK", 1, Some(1), isblank_fn);
        reg!("ISERROR", 1, Some(1), iserror_fn);
        reg!("TEXT", 1, Some(2), text_fn);
        reg!("CONCATENATE", 0, None, concatenate);
        reg!("NOW", 0, Some(0), now_fn);
        reg!("TODAY", 0, Some(0), today_fn);
        reg!("TIME", 3, Some(3), time_fn);
        reg!("DATE", 3, Some(3), date_fn);
        reg!("EDATE", 2, Some(2), edate_fn);
        reg!("DAYS360", 2, Some(2), days360_fn);
        reg!("YEAR", 1, Some(1), year_fn);
        reg!("MONTH", 1, Some(1), month_fn);

        FunctionRegistry { functions }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(name.to_ascii_uppercase().as_str())
    }

    pub fn check_arity(descriptor: &FunctionDescriptor, arg_count: usize) -> Result<(), EvalError> {
        if arg_count < descriptor.min_args {
            return Err(EvalError::ArgumentCount);
        }
        if let Some(max) = descriptor.max_args {
            if arg_count > max {
                return Err(EvalError::ArgumentCount);
            }
        } else if arg_count > 255 {
            return Err(EvalError::ArgumentCount);
        }
        Ok(())
    }
}

fn numbers_only(args: &[Variant]) -> Result<Vec<f64>, EvalError> {
    args.iter().filter(|v| v.has_value()).map(|v| v.to_number().map_err(EvalError::from)).collect()
}

fn sum(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let total: f64 = args.iter().filter(|v| v.has_value()).try_fold(0.0, |acc, v| {
        v.to_number().map(|n| acc + n)
    })?;
    Ok(Variant::Number(total))
}

fn average(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let values = numbers_only(args)?;
    if values.is_empty() {
        return Err(EvalError::ArgumentKind);
    }
    Ok(Variant::Number(values.iter().sum::<f64>() / values.len() as f64))
}

fn min_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let values = numbers_only(args)?;
    values.into_iter().fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |m| m.min(n))))
        .map(Variant::Number)
        .ok_or(EvalError::ArgumentKind)
}

fn max_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let values = numbers_only(args)?;
    values.into_iter().fold(None, |acc: Option<f64>, n| Some(acc.map_or(n, |m| m.max(n))))
        .map(Variant::Number)
        .ok_or(EvalError::ArgumentKind)
}

fn count(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Number(args.iter().filter(|v| matches!(v, Variant::Number(_))).count() as f64))
}

fn counta(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Number(args.iter().filter(|v| v.has_value()).count() as f64))
}

fn if_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    if args[0].to_bool() {
        Ok(args[1].clone())
    } else if args.len() > 2 {
        Ok(args[2].clone())
    } else {
        Ok(Variant::Boolean(false))
    }
}

fn and_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Boolean(args.iter().all(|v| v.to_bool())))
}

fn or_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Boolean(args.iter().any(|v| v.to_bool())))
}

fn not_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Boolean(!args[0].to_bool()))
}

fn abs_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Number(args[0].to_number()?.abs()))
}

fn round_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let n = args[0].to_number()?;
    let digits = args[1].to_number()? as i32;
    let factor = 10f64.powi(digits);
    Ok(Variant::Number((n * factor).round() / factor))
}

fn floor_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Number(args[0].to_number()?.floor()))
}

fn ceiling_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Number(args[0].to_number()?.ceil()))
}

fn sqrt_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let n = args[0].to_number()?;
    if n < 0.0 {
        return Err(EvalError::NumericOverflow);
    }
    Ok(Variant::Number(n.sqrt()))
}

fn power_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Number(args[0].to_number()?.powf(args[1].to_number()?)))
}

fn mod_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let divisor = args[1].to_number()?;
    if divisor == 0.0 {
        return Err(EvalError::DivideByZero);
    }
    Ok(Variant::Number(args[0].to_number()?.rem_euclid(divisor)))
}

fn int_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Number(args[0].to_number()?.floor()))
}

fn sign_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let n = args[0].to_number()?;
    Ok(Variant::Number(if n > 0.0 { 1.0 } else if n < 0.0 { -1.0 } else { 0.0 }))
}

fn len_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Number(args[0].to_display_string().chars().count() as f64))
}

fn upper_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Text(args[0].to_display_string().to_uppercase()))
}

fn lower_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Text(args[0].to_display_string().to_lowercase()))
}

fn trim_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Text(args[0].to_display_string().trim().to_string()))
}

fn left_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let text = args[0].to_display_string();
    let count = if args.len() > 1 { args[1].to_number()? as usize } else { 1 };
    Ok(Variant::Text(text.chars().take(count).collect()))
}

fn right_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let text = args[0].to_display_string();
    let count = if args.len() > 1 { args[1].to_number()? as usize } else { 1 };
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(count);
    Ok(Variant::Text(chars[start..].iter().collect()))
}

fn mid_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let text = args[0].to_display_string();
    let start = (args[1].to_number()? as usize).saturating_sub(1);
    let count = args[2].to_number()? as usize;
    Ok(Variant::Text(text.chars().skip(start).take(count).collect()))
}

fn rept_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let text = args[0].to_display_string();
    let count = args[1].to_number()? as usize;
    Ok(Variant::Text(text.repeat(count)))
}

fn isnumber_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Boolean(matches!(args[0], Variant::Number(_))))
}

fn istext_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Boolean(matches!(args[0], Variant::Text(_))))
}

fn isblank_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Boolean(!args[0].has_value()))
}

fn iserror_fn(_args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    // Errors never reach function arguments as Variants (§4.5 propagates
    // them as Err before the call), so a literal argument is never one.
    Ok(Variant::Boolean(false))
}

fn text_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Text(args[0].to_display_string()))
}

fn concatenate(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    Ok(Variant::Text(args.iter().map(|v| v.to_display_string()).collect()))
}

/// §4.4: sets the caller's format to `dd/mm/yyyy h:mm` when it has none or
/// is `general`, as a side effect of the call.
fn now_fn(_args: &[Variant], ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    ctx.set_current_format_if_unset(Format::CustomWithPattern("dd/mm/yyyy h:mm".to_string()));
    Ok(Variant::Number(ctx.now()))
}

fn today_fn(_args: &[Variant], ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    ctx.set_current_format_if_unset(Format::DateDmy);
    Ok(Variant::Number(ctx.now().floor()))
}

fn time_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let h = args[0].to_number()? as u32;
    let m = args[1].to_number()? as u32;
    let s = args[2].to_number()? as u32;
    Ok(Variant::Number(serial_date::time_serial(h, m, s)))
}

fn date_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let y = args[0].to_number()? as i32;
    let m = args[1].to_number()? as u32;
    let d = args[2].to_number()? as u32;
    Ok(Variant::Number(serial_date::date_serial(y, m, d)))
}

fn edate_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let start = args[0].to_number()?;
    let months = args[1].to_number()? as i64;
    serial_date::edate(start, months).map(Variant::Number).ok_or(EvalError::DateOutOfRange)
}

fn days360_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let start = args[0].to_number()?;
    let end = args[1].to_number()?;
    serial_date::days360(start, end).map(|d| Variant::Number(d as f64)).ok_or(EvalError::DateOutOfRange)
}

fn year_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let serial = args[0].to_number()?;
    serial_date::year_of(serial).map(|y| Variant::Number(y as f64)).ok_or(EvalError::DateOutOfRange)
}

fn month_fn(args: &[Variant], _ctx: &mut CalcContext) -> Result<Variant, EvalError> {
    let serial = args[0].to_number()?;
    serial_date::month_of(serial).map(|m| Variant::Number(m as f64)).ok_or(EvalError::DateOutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_resolves_case_insensitively() {
        let registry = FunctionRegistry::new();
        assert!(registry.get("sum").is_some());
        assert!(registry.get("Sum").is_some());
        assert!(registry.get("NOPE").is_none());
    }

    #[test]
    fn arity_check_rejects_too_few_or_too_many() {
        let registry = FunctionRegistry::new();
        let date = registry.get("DATE").unwrap();
        assert!(FunctionRegistry::check_arity(date, 2).is_err());
        assert!(FunctionRegistry::check_arity(date, 3).is_ok());
        assert!(FunctionRegistry::check_arity(date, 4).is_err());
    }

    #[test]
    fn sum_skips_empty_arguments() {
        let mut dummy = CalcContext::dummy_for_tests();
        let result = sum(&[Variant::Number(1.0), Variant::Empty, Variant::Number(2.0)], &mut dummy).unwrap();
        assert_eq!(result, Variant::Number(3.0));
    }

    #[test]
    fn concatenate_is_identity_on_empty_args() {
        let mut dummy = CalcContext::dummy_for_tests();
        let result = concatenate(&[], &mut dummy).unwrap();
        assert_eq!(result, Variant::Text(String::new()));
    }

    #[test]
    fn concatenate_is_associative() {
        let mut dummy = CalcContext::dummy_for_tests();
        let parts = [Variant::Text("a".to_string()), Variant::Text("b".to_string()), Variant::Text("c".to_string())];
        let left_first = concatenate(&[concatenate(&parts[..2], &mut dummy).unwrap(), parts[2].clone()], &mut dummy).unwrap();
        let right_first = concatenate(&[parts[0].clone(), concatenate(&parts[1..], &mut dummy).unwrap()], &mut dummy).unwrap();
        assert_eq!(left_first, right_first);
    }

    #[test]
    fn now_is_idempotent_within_one_call_site() {
        let mut dummy = CalcContext::dummy_for_tests();
        let first = now_fn(&[], &mut dummy).unwrap();
        let second = now_fn(&[], &mut dummy).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sum_decomposes_over_a_split_range() {
        let mut dummy = CalcContext::dummy_for_tests();
        let all = [Variant::Number(4.0), Variant::Number(9.0), Variant::Number(2.0)];
        let whole = sum(&all, &mut dummy).unwrap();
        let without_last = sum(&all[..2], &mut dummy).unwrap();
        let recombined = without_last.add(&all[2]).unwrap();
        assert_eq!(whole, recombined);
    }
}
