//! Postfix expression typing.
//!
//! Runs once, when an expression completes. The value sequence is walked
//! with a type stack; arithmetic is int-only, comparison demands matching
//! operand types and yields bool. Operands typed `UNKNOWN` come from
//! designators that already reported an error, they pass through without
//! a second diagnostic.

use crate::model::{builtin, ExprId, ExprValue, TypeId};
use rill_syntax::TokenSpan;

use super::Resolver;

pub(crate) fn check_expression(r: &mut Resolver<'_>, eid: ExprId) -> TypeId {
    let expr = r.program.expr(eid);
    let span = expr.span;
    let values = expr.values.clone();

    let mut stack: Vec<TypeId> = Vec::new();
    for value in values {
        match value {
            ExprValue::ConstInt(_) => stack.push(builtin::INT),
            ExprValue::ConstBool(_) => stack.push(builtin::BOOL),
            ExprValue::Designator(d) => stack.push(r.program.designator(d).type_id),
            ExprValue::Add | ExprValue::Sub | ExprValue::Mul | ExprValue::Div => {
                let (left, right) = match pop_pair(r, &mut stack, span) {
                    Some(pair) => pair,
                    None => return builtin::UNKNOWN,
                };
                if known(left, right) {
                    if left != builtin::INT {
                        r.error("arithmetic requires int operands", Some(span));
                    } else if right != left {
                        r.error("arithmetic operands must have the same type", Some(span));
                    }
                }
                stack.push(builtin::INT);
            }
            ExprValue::Eq | ExprValue::Ne => {
                let (left, right) = match pop_pair(r, &mut stack, span) {
                    Some(pair) => pair,
                    None => return builtin::UNKNOWN,
                };
                if known(left, right) && left != right {
                    r.error("cannot compare values of different types", Some(span));
                }
                stack.push(builtin::BOOL);
            }
            ExprValue::Neg => {
                let Some(operand) = stack.pop() else {
                    r.error("malformed expression", Some(span));
                    return builtin::UNKNOWN;
                };
                if operand != builtin::UNKNOWN && operand != builtin::INT {
                    r.error("negation requires an int operand", Some(span));
                }
                stack.push(builtin::INT);
            }
        }
    }

    match stack.len() {
        1 => stack[0],
        _ => {
            r.error("malformed expression", Some(span));
            builtin::UNKNOWN
        }
    }
}

fn known(left: TypeId, right: TypeId) -> bool {
    left != builtin::UNKNOWN && right != builtin::UNKNOWN
}

fn pop_pair(
    r: &mut Resolver<'_>,
    stack: &mut Vec<TypeId>,
    span: TokenSpan,
) -> Option<(TypeId, TypeId)> {
    let right = stack.pop();
    let left = stack.pop();
    match (left, right) {
        (Some(l), Some(ri)) => Some((l, ri)),
        _ => {
            r.error("malformed expression", Some(span));
            None
        }
    }
}
