use std::collections::HashMap;
use std::rc::Rc;

use crate::lang::{
    ast::{BlockStatement, Expression, InfixOp, PrefixOp, Program, Statement},
    env::{Env, Environment},
    object::{Function, Object},
};

// =============================================================================
// EVAL - Tree-walking interpreter
// =============================================================================
//
// The reference engine: walks the AST directly against an environment
// chain. Failures travel as `Object::Error` values so evaluation can stop
// at the first one; `return` travels as `Object::ReturnValue` until the
// enclosing function call unwraps it.

pub fn eval_program(program: &Program, env: &Env) -> Object {
    let mut result = Object::Null;
    for statement in &program.statements {
        result = eval_statement(statement, env);
        match result {
            // Nothing unwraps a return at the top level; the bytecode
            // engine rejects this at compile time.
            Object::ReturnValue(_) => {
                return Object::Error("return outside of a function".to_string());
            }
            Object::Error(_) => return result,
            _ => {}
        }
    }
    result
}

fn eval_statement(statement: &Statement, env: &Env) -> Object {
    match statement {
        Statement::Let { name, value } => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            env.borrow_mut().set(name, value);
            Object::Null
        }
        Statement::Return(value) => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }
            Object::ReturnValue(Box::new(value))
        }
        Statement::Expression(expression) => eval_expression(expression, env),
    }
}

fn eval_block(block: &BlockStatement, env: &Env) -> Object {
    let mut result = Object::Null;
    for statement in &block.statements {
        result = eval_statement(statement, env);
        // ReturnValue stays wrapped so it unwinds through nested blocks.
        if matches!(result, Object::ReturnValue(_) | Object::Error(_)) {
            return result;
        }
    }
    result
}

fn eval_expression(expression: &Expression, env: &Env) -> Object {
    match expression {
        Expression::IntegerLiteral(value) => Object::Integer(*value),
        Expression::StringLiteral(value) => Object::Str(value.clone()),
        Expression::BooleanLiteral(value) => Object::Boolean(*value),
        Expression::Identifier(name) => match env.borrow().get(name) {
            Some(value) => value,
            None => Object::Error(format!("identifier not found: {name}")),
        },
        Expression::Prefix { operator, right } => {
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_prefix(*operator, right)
        }
        Expression::Infix {
            left,
            operator,
            right,
        } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }
            eval_infix(*operator, left, right)
        }
        Expression::If {
            condition,
            consequence,
            alternative,
        } => {
            let condition = eval_expression(condition, env);
            if condition.is_error() {
                return condition;
            }
            if condition.is_truthy() {
                eval_block(consequence, env)
            } else if let Some(alternative) = alternative {
                eval_block(alternative, env)
            } else {
                Object::Null
            }
        }
        Expression::FunctionLiteral { parameters, body } => Object::Function(Function {
            parameters: parameters.clone(),
            body: body.clone(),
            env: Rc::clone(env),
        }),
        Expression::Call {
            function,
            arguments,
        } => {
            let function = eval_expression(function, env);
            if function.is_error() {
                return function;
            }
            let mut args = Vec::with_capacity(arguments.len());
            for argument in arguments {
                let value = eval_expression(argument, env);
                if value.is_error() {
                    return value;
                }
                args.push(value);
            }
            apply_function(function, args)
        }
        Expression::ArrayLiteral(elements) => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                let value = eval_expression(element, env);
                if value.is_error() {
                    return value;
                }
                values.push(value);
            }
            Object::Array(values)
        }
        Expression::HashLiteral(pairs) => {
            let mut map = HashMap::with_capacity(pairs.len());
            for (key, value) in pairs {
                let key = eval_expression(key, env);
                if key.is_error() {
                    return key;
                }
                let Some(hash_key) = key.hash_key() else {
                    return Object::Error(format!("unusable as hash key: {}", key.type_name()));
                };
                let value = eval_expression(value, env);
                if value.is_error() {
                    return value;
                }
                map.insert(hash_key, value);
            }
            Object::Hash(map)
        }
        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }
            let index = eval_expression(index, env);
            if index.is_error() {
                return index;
            }
            eval_index(left, index)
        }
    }
}

fn eval_prefix(operator: PrefixOp, right: Object) -> Object {
    match operator {
        PrefixOp::Bang => Object::Boolean(!right.is_truthy()),
        PrefixOp::Minus => match right {
            Object::Integer(value) => Object::Integer(value.wrapping_neg()),
            other => Object::Error(format!(
                "unsupported type for negation: {}",
                other.type_name()
            )),
        },
    }
}

fn eval_infix(operator: InfixOp, left: Object, right: Object) -> Object {
    match (&left, &right) {
        (Object::Integer(l), Object::Integer(r)) => eval_integer_infix(operator, *l, *r),
        (Object::Str(l), Object::Str(r)) => match operator {
            InfixOp::Plus => Object::Str(format!("{l}{r}")),
            InfixOp::Eq => Object::Boolean(l == r),
            InfixOp::NotEq => Object::Boolean(l != r),
            _ => Object::Error(format!(
                "unknown operator: STRING {operator} STRING"
            )),
        },
        _ => match operator {
            InfixOp::Eq => Object::Boolean(left == right),
            InfixOp::NotEq => Object::Boolean(left != right),
            _ if left.type_name() == right.type_name() => Object::Error(format!(
                "unknown operator: {} {} {}",
                left.type_name(),
                operator,
                right.type_name()
            )),
            _ => Object::Error(format!(
                "type mismatch: {} {} {}",
                left.type_name(),
                operator,
                right.type_name()
            )),
        },
    }
}

fn eval_integer_infix(operator: InfixOp, left: i64, right: i64) -> Object {
    match operator {
        InfixOp::Plus => Object::Integer(left.wrapping_add(right)),
        InfixOp::Minus => Object::Integer(left.wrapping_sub(right)),
        InfixOp::Asterisk => Object::Integer(left.wrapping_mul(right)),
        InfixOp::Slash => {
            if right == 0 {
                Object::Error("division by zero".to_string())
            } else {
                Object::Integer(left.wrapping_div(right))
            }
        }
        InfixOp::Lt => Object::Boolean(left < right),
        InfixOp::Gt => Object::Boolean(left > right),
        InfixOp::Eq => Object::Boolean(left == right),
        InfixOp::NotEq => Object::Boolean(left != right),
    }
}

fn apply_function(function: Object, args: Vec<Object>) -> Object {
    let Object::Function(function) = function else {
        return Object::Error(format!("calling non-function: {}", function.type_name()));
    };
    if args.len() != function.parameters.len() {
        return Object::Error(format!(
            "wrong number of arguments: want={}, got={}",
            function.parameters.len(),
            args.len()
        ));
    }
    let local = Environment::enclosed(Rc::clone(&function.env));
    for (parameter, value) in function.parameters.iter().zip(args) {
        local.borrow_mut().set(parameter, value);
    }
    match eval_block(&function.body, &local) {
        Object::ReturnValue(value) => *value,
        other => other,
    }
}

fn eval_index(left: Object, index: Object) -> Object {
    match (left, index) {
        (Object::Array(elements), Object::Integer(i)) => {
            if i < 0 {
                return Object::Null;
            }
            elements.get(i as usize).cloned().unwrap_or(Object::Null)
        }
        (Object::Hash(pairs), key) => match key.hash_key() {
            Some(hash_key) => pairs.get(&hash_key).cloned().unwrap_or(Object::Null),
            None => Object::Error(format!("unusable as hash key: {}", key.type_name())),
        },
        (left, _) => Object::Error(format!(
            "index operator not supported: {}",
            left.type_name()
        )),
    }
}
