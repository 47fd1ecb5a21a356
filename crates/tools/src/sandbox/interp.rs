//! Tree-walking evaluator with a fuel budget.

use std::collections::{BTreeMap, HashMap};

use super::parser::{Expr, Stmt, TemplatePart};
use super::value::{Value, format_number};
use super::{Host, ScriptError};

/// Largest value (by approximate byte weight) a script may build.
const MAX_VALUE_BYTES: usize = 1 << 20;

/// Largest gap a single array index assignment may open.
const MAX_ARRAY_GAP: usize = 10_000;

struct Binding {
    value: Value,
    constant: bool,
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter<'h> {
    host: &'h mut dyn Host,
    budget: u64,
    fuel: u64,
    scopes: Vec<HashMap<String, Binding>>,
}

impl<'h> Interpreter<'h> {
    pub fn new(host: &'h mut dyn Host, budget: u64) -> Self {
        Self {
            host,
            budget,
            fuel: budget,
            scopes: vec![HashMap::new()],
        }
    }

    /// Steps consumed so far.
    pub fn steps(&self) -> u64 {
        self.budget - self.fuel
    }

    /// Run a program, returning the value of a top-level `return`.
    pub fn run(&mut self, program: &[Stmt]) -> Result<Value, ScriptError> {
        match self.exec_all(program)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Undefined),
        }
    }

    fn tick(&mut self) -> Result<(), ScriptError> {
        if self.fuel == 0 {
            return Err(ScriptError::OutOfFuel(self.budget));
        }
        self.fuel -= 1;
        Ok(())
    }

    // ── Scopes ──────────────────────────────────────────────────────────

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .map(|b| &b.value)
    }

    fn binding_mut(&mut self, name: &str) -> Result<&mut Binding, ScriptError> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
            .ok_or_else(|| ScriptError::Reference(name.to_string()))
    }

    fn declare(&mut self, name: &str, value: Value, constant: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Binding { value, constant });
        }
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn exec_all(&mut self, stmts: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        self.tick()?;
        match stmt {
            Stmt::Empty => Ok(Flow::Normal),
            Stmt::Declare {
                name,
                init,
                constant,
            } => {
                let value = match init {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                self.declare(name, value, *constant);
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.scoped(|me| me.exec(then))
                } else if let Some(otherwise) = otherwise {
                    self.scoped(|me| me.exec(otherwise))
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    match self.scoped(|me| me.exec(body))? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => self.scoped(|me| {
                if let Some(init) = init {
                    me.exec(init)?;
                }
                loop {
                    if let Some(cond) = cond
                        && !me.eval(cond)?.truthy()
                    {
                        break;
                    }
                    match me.scoped(|inner| inner.exec(body))? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        me.eval(update)?;
                    } else {
                        me.tick()?;
                    }
                }
                Ok(Flow::Normal)
            }),
            Stmt::Block(stmts) => self.scoped(|me| me.exec_all(stmts)),
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Throw(expr) => {
                let value = self.eval(expr)?;
                Err(ScriptError::Thrown(describe_thrown(&value)))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        self.tick()?;
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Raw(raw) => out.push_str(raw),
                        TemplatePart::Expr(expr) => out.push_str(&self.eval(expr)?.to_display()),
                    }
                }
                checked(Value::Str(out))
            }
            Expr::Ident(name) => self
                .lookup(name)
                .cloned()
                .ok_or_else(|| ScriptError::Reference(name.clone())),
            Expr::Array(items) => {
                let values = self.eval_args(items)?;
                checked(Value::Array(values))
            }
            Expr::Object(fields) => {
                let mut map = BTreeMap::new();
                for (key, expr) in fields {
                    let value = self.eval(expr)?;
                    map.insert(key.clone(), value);
                }
                checked(Value::Object(map))
            }
            Expr::Member { object, property } => {
                if let Some(constant) = self.global_constant(object, property) {
                    return Ok(constant);
                }
                let target = self.eval(object)?;
                get_property(&target, property)
            }
            Expr::Index { object, index } => {
                let target = self.eval(object)?;
                let key = self.eval(index)?;
                get_index(&target, &key)
            }
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::New { constructor, args } => {
                let args = self.eval_args(args)?;
                match constructor.as_str() {
                    "Error" | "TypeError" | "RangeError" => {
                        Ok(error_object(constructor, args.first()))
                    }
                    other => Err(ScriptError::Type(format!("{other} is not a constructor"))),
                }
            }
            Expr::Unary { op, operand } => {
                if *op == "typeof" {
                    if let Expr::Ident(name) = &**operand
                        && self.lookup(name).is_none()
                    {
                        return Ok(Value::Str("undefined".into()));
                    }
                    let value = self.eval(operand)?;
                    return Ok(Value::Str(value.type_name().into()));
                }
                let value = self.eval(operand)?;
                Ok(match *op {
                    "!" => Value::Bool(!value.truthy()),
                    "-" => Value::Number(-value.to_number()),
                    _ => Value::Number(value.to_number()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(op, left, right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let short_circuit = match *op {
                    "&&" => !left.truthy(),
                    "||" => left.truthy(),
                    _ => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign { op, target, value } => {
                let value = if *op == "=" {
                    self.eval(value)?
                } else {
                    let current = self.eval(target)?;
                    let rhs = self.eval(value)?;
                    binary(&op[..1], current, rhs)?
                };
                self.assign(target, value.clone())?;
                Ok(value)
            }
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.eval(target)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign(target, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn is_global(&self, expr: &Expr, namespace: &str) -> bool {
        matches!(expr, Expr::Ident(name) if name == namespace && self.lookup(name).is_none())
    }

    fn global_constant(&self, object: &Expr, property: &str) -> Option<Value> {
        if !self.is_global(object, "Math") {
            return None;
        }
        match property {
            "PI" => Some(Value::Number(std::f64::consts::PI)),
            "E" => Some(Value::Number(std::f64::consts::E)),
            _ => None,
        }
    }

    // ── Assignment ──────────────────────────────────────────────────────

    /// Resolve an assignable expression to its root variable and key path.
    fn place_path(&mut self, expr: &Expr) -> Result<(String, Vec<Value>), ScriptError> {
        match expr {
            Expr::Ident(name) => Ok((name.clone(), Vec::new())),
            Expr::Member { object, property } => {
                let (root, mut keys) = self.place_path(object)?;
                keys.push(Value::Str(property.clone()));
                Ok((root, keys))
            }
            Expr::Index { object, index } => {
                let (root, mut keys) = self.place_path(object)?;
                keys.push(self.eval(index)?);
                Ok((root, keys))
            }
            _ => Err(ScriptError::Type("invalid assignment target".into())),
        }
    }

    fn place_mut(&mut self, root: &str, keys: &[Value]) -> Result<&mut Value, ScriptError> {
        let mut current = &mut self.binding_mut(root)?.value;
        for key in keys {
            current = match current {
                Value::Object(map) => map.get_mut(&key.to_display()),
                Value::Array(items) => array_index(key).and_then(|i| items.get_mut(i)),
                _ => None,
            }
            .ok_or_else(|| {
                ScriptError::Type(format!(
                    "Cannot set properties of undefined (setting '{}')",
                    key.to_display()
                ))
            })?;
        }
        Ok(current)
    }

    fn check_binding(&mut self, root: &str) -> Result<(), ScriptError> {
        let binding = self.binding_mut(root)?;
        if binding.value.weight() > MAX_VALUE_BYTES {
            return Err(memory_exceeded());
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), ScriptError> {
        let (root, mut keys) = self.place_path(target)?;
        let Some(last) = keys.pop() else {
            let binding = self.binding_mut(&root)?;
            if binding.constant {
                return Err(ScriptError::Type("Assignment to constant variable.".into()));
            }
            binding.value = value;
            return Ok(());
        };
        let container = self.place_mut(&root, &keys)?;
        set_property(container, &last, value)?;
        self.check_binding(&root)
    }

    // ── Calls ───────────────────────────────────────────────────────────

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, ScriptError> {
        match callee {
            Expr::Ident(name) => {
                if self.lookup(name).is_some() {
                    return Err(ScriptError::Type(format!("{name} is not a function")));
                }
                let args = self.eval_args(args)?;
                self.call_global(name, args)
            }
            Expr::Member { object, property } => {
                if self.is_global(object, "Math") {
                    let args = self.eval_args(args)?;
                    return call_math(property, args);
                }
                let mutator = matches!(property.as_str(), "push" | "pop" | "shift" | "unshift");
                if mutator && is_place(object) {
                    let (root, keys) = self.place_path(object)?;
                    let args = self.eval_args(args)?;
                    let target = self.place_mut(&root, &keys)?;
                    let result = mutate_array(target, property, args)?;
                    self.check_binding(&root)?;
                    return Ok(result);
                }
                let mut receiver = self.eval(object)?;
                let args = self.eval_args(args)?;
                if mutator {
                    return mutate_array(&mut receiver, property, args);
                }
                call_method(&receiver, property, &args)
            }
            _ => Err(ScriptError::Type("expression is not a function".into())),
        }
    }

    fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let first = args.first().cloned().unwrap_or(Value::Undefined);
        match name {
            "getInternalState" => Ok(Value::from(&self.host.internal_state())),
            "updateSelfModel" => match first {
                Value::Object(map) => {
                    let delta = map
                        .iter()
                        .filter(|(_, v)| !matches!(v, Value::Undefined))
                        .map(|(k, v)| (k.clone(), v.to_json()))
                        .collect();
                    Ok(Value::from(&self.host.update_self_model(delta)))
                }
                other => Err(ScriptError::Type(format!(
                    "updateSelfModel expects an object, got {}",
                    other.type_name()
                ))),
            },
            "addLog" => {
                let line = args
                    .iter()
                    .map(Value::to_display)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.host.add_log(line);
                Ok(Value::Undefined)
            }
            "Number" => Ok(Value::Number(if args.is_empty() {
                0.0
            } else {
                first.to_number()
            })),
            "String" => Ok(Value::Str(if args.is_empty() {
                String::new()
            } else {
                first.to_display()
            })),
            "Boolean" => Ok(Value::Bool(first.truthy())),
            "parseFloat" => Ok(Value::Number(parse_float_prefix(&first.to_display()))),
            "parseInt" => Ok(Value::Number(parse_float_prefix(&first.to_display()).trunc())),
            "isNaN" => Ok(Value::Bool(first.to_number().is_nan())),
            "isFinite" => Ok(Value::Bool(first.to_number().is_finite())),
            _ => Err(ScriptError::Reference(name.to_string())),
        }
    }
}

// ── Builtins ────────────────────────────────────────────────────────────

fn call_math(method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let nums: Vec<f64> = args.iter().map(Value::to_number).collect();
    let x = nums.first().copied().unwrap_or(f64::NAN);
    let result = match method {
        "min" => nums.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "round" => (x + 0.5).floor(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "trunc" => x.trunc(),
        "abs" => x.abs(),
        "sqrt" => x.sqrt(),
        "log" => x.ln(),
        "exp" => x.exp(),
        "sign" if x == 0.0 || x.is_nan() => x,
        "sign" => x.signum(),
        "pow" => x.powf(nums.get(1).copied().unwrap_or(f64::NAN)),
        "random" => rand::random::<f64>(),
        _ => return Err(ScriptError::Type(format!("Math.{method} is not a function"))),
    };
    Ok(Value::Number(result))
}

fn mutate_array(target: &mut Value, method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    let Value::Array(items) = target else {
        return Err(ScriptError::Type(format!(
            "{}.{method} is not a function",
            target.type_name()
        )));
    };
    Ok(match method {
        "push" => {
            items.extend(args);
            Value::Number(items.len() as f64)
        }
        "unshift" => {
            items.splice(0..0, args);
            Value::Number(items.len() as f64)
        }
        "pop" => items.pop().unwrap_or(Value::Undefined),
        _ => {
            if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            }
        }
    })
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
    match (receiver, method) {
        (Value::Undefined | Value::Null, _) => Err(ScriptError::Type(format!(
            "Cannot read properties of {} (reading '{method}')",
            receiver.to_display()
        ))),
        (Value::Number(n), "toFixed") => {
            let digits = arg(0).to_number();
            let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
            if !(0.0..=100.0).contains(&digits) {
                return Err(ScriptError::Range(
                    "toFixed() digits argument must be between 0 and 100".into(),
                ));
            }
            Ok(Value::Str(format!("{:.*}", digits as usize, n)))
        }
        (_, "toString") => Ok(Value::Str(receiver.to_display())),
        (Value::Str(s), "toUpperCase") => Ok(Value::Str(s.to_uppercase())),
        (Value::Str(s), "toLowerCase") => Ok(Value::Str(s.to_lowercase())),
        (Value::Str(s), "trim") => Ok(Value::Str(s.trim().to_string())),
        (Value::Str(s), "includes") => Ok(Value::Bool(s.contains(&arg(0).to_display()))),
        (Value::Str(s), "startsWith") => Ok(Value::Bool(s.starts_with(&arg(0).to_display()))),
        (Value::Str(s), "endsWith") => Ok(Value::Bool(s.ends_with(&arg(0).to_display()))),
        (Value::Str(s), "indexOf") => {
            let needle = arg(0).to_display();
            let index = s
                .find(&needle)
                .map(|byte| s[..byte].chars().count() as f64)
                .unwrap_or(-1.0);
            Ok(Value::Number(index))
        }
        (Value::Str(s), "slice") => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), args);
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        (Value::Str(s), "split") => {
            let parts = match arg(0) {
                Value::Undefined => vec![Value::Str(s.clone())],
                sep => {
                    let sep = sep.to_display();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::Str(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect()
                    }
                }
            };
            checked(Value::Array(parts))
        }
        (Value::Str(s), "repeat") => {
            let count = arg(0).to_number();
            if count < 0.0 || !count.is_finite() {
                return Err(ScriptError::Range(format!("Invalid count value: {}", format_number(count))));
            }
            let count = count as usize;
            if s.len().saturating_mul(count) > MAX_VALUE_BYTES {
                return Err(memory_exceeded());
            }
            Ok(Value::Str(s.repeat(count)))
        }
        (Value::Array(items), "join") => {
            let sep = match arg(0) {
                Value::Undefined => ",".to_string(),
                sep => sep.to_display(),
            };
            let joined = items
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { v.to_display() })
                .collect::<Vec<_>>()
                .join(&sep);
            checked(Value::Str(joined))
        }
        (Value::Array(items), "includes") => {
            let needle = arg(0);
            Ok(Value::Bool(items.iter().any(|v| v.strict_eq(&needle))))
        }
        (Value::Array(items), "indexOf") => {
            let needle = arg(0);
            let index = items
                .iter()
                .position(|v| v.strict_eq(&needle))
                .map(|i| i as f64)
                .unwrap_or(-1.0);
            Ok(Value::Number(index))
        }
        (Value::Array(items), "slice") => {
            let (start, end) = slice_bounds(items.len(), args);
            Ok(Value::Array(items[start..end].to_vec()))
        }
        (Value::Array(items), "concat") => {
            let mut out = items.clone();
            for value in args {
                match value {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            checked(Value::Array(out))
        }
        _ => Err(ScriptError::Type(format!(
            "{}.{method} is not a function",
            receiver.type_name()
        ))),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn binary(op: &str, left: Value, right: Value) -> Result<Value, ScriptError> {
    let stringy = |v: &Value| matches!(v, Value::Str(_) | Value::Array(_) | Value::Object(_));
    Ok(match op {
        "+" if stringy(&left) || stringy(&right) => {
            let mut text = left.to_display();
            text.push_str(&right.to_display());
            return checked(Value::Str(text));
        }
        "+" => Value::Number(left.to_number() + right.to_number()),
        "-" => Value::Number(left.to_number() - right.to_number()),
        "*" => Value::Number(left.to_number() * right.to_number()),
        "/" => Value::Number(left.to_number() / right.to_number()),
        "%" => Value::Number(left.to_number() % right.to_number()),
        "<" | "<=" | ">" | ">=" => {
            let ordering = match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Bool(match (op, ordering) {
                (_, None) => false,
                ("<", Some(o)) => o.is_lt(),
                ("<=", Some(o)) => o.is_le(),
                (">", Some(o)) => o.is_gt(),
                (_, Some(o)) => o.is_ge(),
            })
        }
        "===" => Value::Bool(left.strict_eq(&right)),
        "!==" => Value::Bool(!left.strict_eq(&right)),
        "==" => Value::Bool(left.loose_eq(&right)),
        "!=" => Value::Bool(!left.loose_eq(&right)),
        _ => return Err(ScriptError::Type(format!("unsupported operator '{op}'"))),
    })
}

fn get_property(target: &Value, name: &str) -> Result<Value, ScriptError> {
    match target {
        Value::Undefined | Value::Null => Err(ScriptError::Type(format!(
            "Cannot read properties of {} (reading '{name}')",
            target.to_display()
        ))),
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Undefined)),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Str(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
        _ => Ok(Value::Undefined),
    }
}

fn get_index(target: &Value, key: &Value) -> Result<Value, ScriptError> {
    match (target, array_index(key)) {
        (Value::Array(items), Some(i)) => Ok(items.get(i).cloned().unwrap_or(Value::Undefined)),
        (Value::Str(s), Some(i)) => Ok(s
            .chars()
            .nth(i)
            .map(|c| Value::Str(c.to_string()))
            .unwrap_or(Value::Undefined)),
        _ => get_property(target, &key.to_display()),
    }
}

fn set_property(container: &mut Value, key: &Value, value: Value) -> Result<(), ScriptError> {
    match container {
        Value::Object(map) => {
            map.insert(key.to_display(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = array_index(key).ok_or_else(|| {
                ScriptError::Type(format!("invalid array index '{}'", key.to_display()))
            })?;
            if index < items.len() {
                items[index] = value;
            } else if index - items.len() <= MAX_ARRAY_GAP {
                items.resize(index, Value::Undefined);
                items.push(value);
            } else {
                return Err(ScriptError::Range("Invalid array length".into()));
            }
            Ok(())
        }
        other => Err(ScriptError::Type(format!(
            "Cannot set properties of {} (setting '{}')",
            other.to_display(),
            key.to_display()
        ))),
    }
}

fn array_index(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n < usize::MAX as f64 => {
            Some(*n as usize)
        }
        Value::Str(s) => s.parse().ok(),
        _ => None,
    }
}

fn slice_bounds(len: usize, args: &[Value]) -> (usize, usize) {
    let resolve = |value: Option<&Value>, default: usize| match value {
        None | Some(Value::Undefined) => default,
        Some(v) => {
            let n = v.to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                (n as usize).min(len)
            }
        }
    };
    let start = resolve(args.first(), 0);
    let end = resolve(args.get(1), len);
    (start, end.max(start))
}

fn is_place(expr: &Expr) -> bool {
    match expr {
        Expr::Ident(_) => true,
        Expr::Member { object, .. } | Expr::Index { object, .. } => is_place(object),
        _ => false,
    }
}

fn parse_float_prefix(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut best = f64::NAN;
    for (i, c) in text.char_indices() {
        if !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')) {
            break;
        }
        end = i + c.len_utf8();
        if let Ok(n) = text[..end].parse::<f64>() {
            best = n;
        }
    }
    best
}

fn error_object(name: &str, message: Option<&Value>) -> Value {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), Value::Str(name.to_string()));
    let message = message.map(Value::to_display).unwrap_or_default();
    map.insert("message".to_string(), Value::Str(message));
    Value::Object(map)
}

fn describe_thrown(value: &Value) -> String {
    match value {
        Value::Object(map) if map.contains_key("message") => {
            let name = map
                .get("name")
                .map(Value::to_display)
                .unwrap_or_else(|| "Error".into());
            let message = map.get("message").map(Value::to_display).unwrap_or_default();
            format!("{name}: {message}")
        }
        other => other.to_display(),
    }
}

fn memory_exceeded() -> ScriptError {
    ScriptError::Range("value exceeds the sandbox memory limit".into())
}

fn checked(value: Value) -> Result<Value, ScriptError> {
    if value.weight() > MAX_VALUE_BYTES {
        return Err(memory_exceeded());
    }
    Ok(value)
}
