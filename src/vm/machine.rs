use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::time::SystemTime;

use crate::{
    compiler::{self, Constant, Function, OpCode},
    errors, LoxError,
};

use super::{
    BoundMethod, Class, Closure, Frame, Instance, LoxString, Native, StringPool, Table, Upvalue,
    Value,
};

/// The call stack cap; recursing past it raises "Stack overflow." instead
/// of overrunning the host stack.
pub const FRAMES_MAX: usize = 64;
/// Every frame addresses at most 256 slots, so this bounds the value stack.
pub const STACK_MAX: usize = FRAMES_MAX * 256;

macro_rules! op_binary {
    ($self:ident, $op:tt => Number) => {{
        let right = $self.pop()?;
        let left = $self.pop()?;
        match (left, right) {
            (Value::Number(left), Value::Number(right)) => {
                $self.push(Value::Number(left $op right))
            }
            _ => return Err(errors::runtime("Operands must be numbers.")),
        }
    }};

    ($self:ident, $op:tt => Bool) => {{
        let right = $self.pop()?;
        let left = $self.pop()?;
        match (left, right) {
            (Value::Number(left), Value::Number(right)) => {
                $self.push(Value::Bool(left $op right))
            }
            _ => return Err(errors::runtime("Operands must be numbers.")),
        }
    }};
}

/// The virtual machine. One instance owns every piece of interpreter
/// state — value stack, call frames, globals, the string pool, and the
/// open-upvalue list — so a REPL can keep feeding it lines and globals
/// persist between them.
pub struct VM {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    globals: Table,
    strings: StringPool,
    // Open upvalues in strictly descending stack-index order.
    open_upvalues: Vec<Rc<RefCell<Upvalue>>>,
    init_string: Rc<LoxString>,
    output: Box<dyn Write>,
}

impl VM {
    pub fn with_output(self, output: Box<dyn Write>) -> Self {
        Self { output, ..self }
    }

    pub fn with_native<N, F>(mut self, name: N, arity: usize, fun: F) -> Self
    where
        N: Into<String>,
        F: Fn(&[Value]) -> Result<Value, LoxError> + 'static,
    {
        let name = name.into();
        let key = self.strings.intern(&name);
        self.globals
            .set(key, Value::Native(Rc::new(Native::new(name, arity, fun))));
        self
    }

    /// Compiles source against this VM's string pool, so compiled
    /// constants and runtime strings share one interning domain.
    pub fn compile(&mut self, source: &str) -> Result<Rc<Function>, Vec<LoxError>> {
        compiler::compile(source, &mut self.strings)
    }

    /// Wraps the script function in a closure, pushes the root frame, and
    /// runs to completion. Runtime failures come back with the stack
    /// trace attached and the VM reset, ready for the next script.
    pub fn call(&mut self, function: Rc<Function>) -> Result<(), LoxError> {
        let closure = Rc::new(Closure::new(function, Vec::new()));
        self.push(Value::Closure(Rc::clone(&closure)));
        self.frames.push(Frame::new(closure, 0));

        self.run()
    }

    fn run(&mut self) -> Result<(), LoxError> {
        match self.execute() {
            Ok(()) => Ok(()),
            Err(LoxError::Runtime(message, _)) => {
                let stacktrace: Vec<String> = self
                    .frames
                    .iter()
                    .rev()
                    .map(|frame| frame.to_string())
                    .collect();
                self.reset();
                Err(errors::runtime_stacktrace(message, stacktrace))
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn execute(&mut self) -> Result<(), LoxError> {
        loop {
            let byte = self.read_byte()?;
            let op = OpCode::from_byte(byte)
                .ok_or_else(|| errors::runtime("Unknown opcode in byte code."))?;

            match op {
                OpCode::Constant => {
                    let value = match self.read_constant()? {
                        Constant::Number(n) => Value::Number(n),
                        Constant::String(s) => Value::String(s),
                        Constant::Function(_) => {
                            return Err(errors::runtime(
                                "Function constants only load through OP_CLOSURE.",
                            ))
                        }
                    };
                    self.push(value);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte()? as usize;
                    let offset = self.frame()?.offset;
                    let value = self
                        .stack
                        .get(offset + slot)
                        .cloned()
                        .ok_or_else(|| errors::runtime("Invalid local slot in byte code."))?;
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte()? as usize;
                    let offset = self.frame()?.offset;
                    let value = self.peek(0)?.clone();
                    match self.stack.get_mut(offset + slot) {
                        Some(entry) => *entry = value,
                        None => return Err(errors::runtime("Invalid local slot in byte code.")),
                    }
                }

                OpCode::GetGlobal => {
                    let name = self.read_string()?;
                    match self.globals.get(&name).cloned() {
                        Some(value) => self.push(value),
                        None => {
                            return Err(errors::runtime(format!(
                                "Undefined variable '{}'.",
                                name
                            )))
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string()?;
                    let value = self.pop()?;
                    self.globals.set(name, value);
                }
                OpCode::SetGlobal => {
                    let name = self.read_string()?;
                    // Assignment never creates a global; check before
                    // writing so a failure leaves the table untouched.
                    if self.globals.get(&name).is_none() {
                        return Err(errors::runtime(format!("Undefined variable '{}'.", name)));
                    }
                    let value = self.peek(0)?.clone();
                    self.globals.set(name, value);
                }

                OpCode::GetUpvalue => {
                    let slot = self.read_byte()? as usize;
                    let upvalue = self.upvalue_at(slot)?;
                    let value = {
                        let upvalue = upvalue.borrow();
                        match &*upvalue {
                            Upvalue::Open(index) => {
                                self.stack.get(*index).cloned().ok_or_else(|| {
                                    errors::runtime("Upvalue references a missing stack slot.")
                                })?
                            }
                            Upvalue::Closed(value) => value.clone(),
                        }
                    };
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte()? as usize;
                    let value = self.peek(0)?.clone();
                    let upvalue = self.upvalue_at(slot)?;
                    let open_index = upvalue.borrow().stack_index();
                    match open_index {
                        Some(index) => match self.stack.get_mut(index) {
                            Some(entry) => *entry = value,
                            None => {
                                return Err(errors::runtime(
                                    "Upvalue references a missing stack slot.",
                                ))
                            }
                        },
                        None => *upvalue.borrow_mut() = Upvalue::Closed(value),
                    }
                }

                OpCode::GetProperty => {
                    let name = self.read_string()?;
                    let receiver = self.peek(0)?.clone();
                    match receiver {
                        Value::Instance(instance) => {
                            let field = instance.fields.borrow().get(&name).cloned();
                            match field {
                                Some(value) => {
                                    self.pop()?;
                                    self.push(value);
                                }
                                None => self.bind_method(&instance.class, &name)?,
                            }
                        }
                        _ => return Err(errors::runtime("Only instances have properties.")),
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string()?;
                    let receiver = self.peek(1)?.clone();
                    match receiver {
                        Value::Instance(instance) => {
                            let value = self.pop()?;
                            instance.fields.borrow_mut().set(name, value.clone());
                            self.pop()?;
                            self.push(value);
                        }
                        _ => return Err(errors::runtime("Only instances have fields.")),
                    }
                }
                OpCode::GetSuper => {
                    let name = self.read_string()?;
                    match self.pop()? {
                        Value::Class(superclass) => self.bind_method(&superclass, &name)?,
                        _ => {
                            return Err(errors::runtime(
                                "Invalid superclass reference in byte code.",
                            ))
                        }
                    }
                }

                OpCode::Equal => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.push(Value::Bool(left == right));
                }
                OpCode::Greater => op_binary!(self, > => Bool),
                OpCode::Less => op_binary!(self, < => Bool),

                OpCode::Add => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    match (left, right) {
                        (Value::Number(left), Value::Number(right)) => {
                            self.push(Value::Number(left + right))
                        }
                        (Value::String(left), Value::String(right)) => {
                            let joined = self
                                .strings
                                .intern(format!("{}{}", left.chars, right.chars));
                            self.push(Value::String(joined));
                        }
                        _ => {
                            return Err(errors::runtime(
                                "Operands must be two numbers or two strings.",
                            ))
                        }
                    }
                }
                OpCode::Subtract => op_binary!(self, - => Number),
                OpCode::Multiply => op_binary!(self, * => Number),
                OpCode::Divide => op_binary!(self, / => Number),

                OpCode::Not => {
                    let value = self.pop()?;
                    self.push(Value::Bool(!value.is_truthy()));
                }
                OpCode::Negate => match self.pop()? {
                    Value::Number(n) => self.push(Value::Number(-n)),
                    _ => return Err(errors::runtime("Operand must be a number.")),
                },

                OpCode::Print => {
                    let value = self.pop()?;
                    writeln!(self.output, "{}", value)?;
                }

                OpCode::Jump => {
                    let offset = self.read_short()?;
                    self.frame_mut()?.ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short()?;
                    if !self.peek(0)?.is_truthy() {
                        self.frame_mut()?.ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short()?;
                    let frame = self.frame_mut()?;
                    frame.ip = frame
                        .ip
                        .checked_sub(offset)
                        .ok_or_else(|| errors::runtime("Loop target precedes the chunk."))?;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte()? as usize;
                    let callee = self.peek(arg_count)?.clone();
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string()?;
                    let arg_count = self.read_byte()? as usize;
                    self.invoke(&name, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string()?;
                    let arg_count = self.read_byte()? as usize;
                    match self.pop()? {
                        Value::Class(superclass) => {
                            self.invoke_from_class(&superclass, &name, arg_count)?
                        }
                        _ => {
                            return Err(errors::runtime(
                                "Invalid superclass reference in byte code.",
                            ))
                        }
                    }
                }

                OpCode::Closure => {
                    let function = match self.read_constant()? {
                        Constant::Function(function) => function,
                        _ => {
                            return Err(errors::runtime(
                                "OP_CLOSURE must reference a function constant.",
                            ))
                        }
                    };

                    let mut upvalues = Vec::with_capacity(function.upvalue_count);
                    for _ in 0..function.upvalue_count {
                        let is_local = self.read_byte()? == 1;
                        let index = self.read_byte()? as usize;

                        if is_local {
                            let offset = self.frame()?.offset;
                            upvalues.push(self.capture_upvalue(offset + index));
                        } else {
                            upvalues.push(self.upvalue_at(index)?);
                        }
                    }

                    self.push(Value::Closure(Rc::new(Closure::new(function, upvalues))));
                }
                OpCode::CloseUpvalue => {
                    let top = self
                        .stack
                        .len()
                        .checked_sub(1)
                        .ok_or_else(|| errors::runtime("Attempted to close an empty stack."))?;
                    self.close_upvalues(top)?;
                    self.pop()?;
                }

                OpCode::Return => {
                    let result = self.pop()?;
                    let frame = self
                        .frames
                        .pop()
                        .ok_or_else(|| errors::runtime("No active frame on the call stack."))?;
                    self.close_upvalues(frame.offset)?;
                    self.stack.truncate(frame.offset);

                    if self.frames.is_empty() {
                        return Ok(());
                    }

                    self.push(result);
                }

                OpCode::Class => {
                    let name = self.read_string()?;
                    self.push(Value::Class(Rc::new(Class::new(name))));
                }
                OpCode::Inherit => {
                    let superclass = self.peek(1)?.clone();
                    let subclass = self.peek(0)?.clone();
                    match (superclass, subclass) {
                        (Value::Class(superclass), Value::Class(subclass)) => {
                            subclass
                                .methods
                                .borrow_mut()
                                .add_all(&superclass.methods.borrow());
                            self.pop()?;
                        }
                        _ => return Err(errors::runtime("Superclass must be a class.")),
                    }
                }
                OpCode::Method => {
                    let name = self.read_string()?;
                    let method = self.peek(0)?.clone();
                    let class = self.peek(1)?.clone();
                    match (class, method) {
                        (Value::Class(class), method @ Value::Closure(_)) => {
                            class.methods.borrow_mut().set(name, method);
                            self.pop()?;
                        }
                        _ => {
                            return Err(errors::runtime("Methods can only be added to classes."))
                        }
                    }
                }
            }
        }
    }

    // ---- stack and frame plumbing ----

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, LoxError> {
        self.stack
            .pop()
            .ok_or_else(|| errors::runtime("Attempted to pop from an empty stack."))
    }

    fn peek(&self, distance: usize) -> Result<&Value, LoxError> {
        if distance < self.stack.len() {
            Ok(&self.stack[self.stack.len() - distance - 1])
        } else {
            Err(errors::runtime(
                "Attempted to peek past the bottom of the stack.",
            ))
        }
    }

    fn frame(&self) -> Result<&Frame, LoxError> {
        self.frames
            .last()
            .ok_or_else(|| errors::runtime("No active frame on the call stack."))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame, LoxError> {
        self.frames
            .last_mut()
            .ok_or_else(|| errors::runtime("No active frame on the call stack."))
    }

    fn read_byte(&mut self) -> Result<u8, LoxError> {
        let frame = self.frame_mut()?;
        let byte = frame.chunk().byte(frame.ip).ok_or_else(|| {
            errors::runtime("Instruction pointer ran off the end of the chunk.")
        })?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_short(&mut self) -> Result<usize, LoxError> {
        let high = self.read_byte()? as usize;
        let low = self.read_byte()? as usize;
        Ok((high << 8) | low)
    }

    fn read_constant(&mut self) -> Result<Constant, LoxError> {
        let index = self.read_byte()? as usize;
        self.frame()?
            .chunk()
            .constant(index)
            .cloned()
            .ok_or_else(|| errors::runtime("Invalid constant index in byte code."))
    }

    fn read_string(&mut self) -> Result<Rc<LoxString>, LoxError> {
        match self.read_constant()? {
            Constant::String(string) => Ok(string),
            _ => Err(errors::runtime("Invalid name constant in byte code.")),
        }
    }

    fn upvalue_at(&self, slot: usize) -> Result<Rc<RefCell<Upvalue>>, LoxError> {
        self.frame()?
            .closure
            .upvalues
            .get(slot)
            .cloned()
            .ok_or_else(|| errors::runtime("Invalid upvalue slot in byte code."))
    }

    // ---- calls ----

    fn call_value(&mut self, callee: Value, arg_count: usize) -> Result<(), LoxError> {
        match callee {
            Value::Closure(closure) => self.call_closure(closure, arg_count),
            Value::BoundMethod(bound) => {
                // The receiver takes the callee's slot, so the method sees
                // it as `this` in slot zero.
                let receiver_slot = self.stack.len() - arg_count - 1;
                self.stack[receiver_slot] = bound.receiver.clone();
                self.call_closure(Rc::clone(&bound.method), arg_count)
            }
            Value::Class(class) => {
                let instance = Value::Instance(Rc::new(Instance::new(Rc::clone(&class))));
                let callee_slot = self.stack.len() - arg_count - 1;
                self.stack[callee_slot] = instance;

                let init = class.methods.borrow().get(&self.init_string).cloned();
                match init {
                    Some(Value::Closure(init)) => self.call_closure(init, arg_count),
                    Some(_) => Err(errors::runtime("Class initializer must be a closure.")),
                    None if arg_count != 0 => Err(errors::runtime(format!(
                        "Expected 0 arguments but got {}.",
                        arg_count
                    ))),
                    None => Ok(()),
                }
            }
            Value::Native(native) => {
                if native.arity != arg_count {
                    return Err(errors::runtime(format!(
                        "Expected {} arguments but got {}.",
                        native.arity, arg_count
                    )));
                }

                let args_start = self.stack.len() - arg_count;
                let result = (native.fun)(&self.stack[args_start..])?;
                self.stack.truncate(args_start - 1);
                self.push(result);
                Ok(())
            }
            _ => Err(errors::runtime("Can only call functions and classes.")),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, arg_count: usize) -> Result<(), LoxError> {
        if closure.function.arity != arg_count {
            return Err(errors::runtime(format!(
                "Expected {} arguments but got {}.",
                closure.function.arity, arg_count
            )));
        }

        if self.frames.len() >= FRAMES_MAX {
            return Err(errors::runtime("Stack overflow."));
        }

        let offset = self.stack.len() - arg_count - 1;
        self.frames.push(Frame::new(closure, offset));
        Ok(())
    }

    fn invoke(&mut self, name: &Rc<LoxString>, arg_count: usize) -> Result<(), LoxError> {
        let receiver = self.peek(arg_count)?.clone();
        match receiver {
            Value::Instance(instance) => {
                // A field shadows a method of the same name; it replaces
                // the receiver on the stack and is called as a plain value.
                let field = instance.fields.borrow().get(name).cloned();
                match field {
                    Some(field) => {
                        let receiver_slot = self.stack.len() - arg_count - 1;
                        self.stack[receiver_slot] = field.clone();
                        self.call_value(field, arg_count)
                    }
                    None => self.invoke_from_class(&instance.class, name, arg_count),
                }
            }
            _ => Err(errors::runtime("Only instances have methods.")),
        }
    }

    fn invoke_from_class(
        &mut self,
        class: &Rc<Class>,
        name: &Rc<LoxString>,
        arg_count: usize,
    ) -> Result<(), LoxError> {
        let method = class.methods.borrow().get(name).cloned();
        match method {
            Some(Value::Closure(method)) => self.call_closure(method, arg_count),
            Some(_) => Err(errors::runtime("Class method must be a closure.")),
            None => Err(errors::runtime(format!("Undefined property '{}'.", name))),
        }
    }

    fn bind_method(&mut self, class: &Rc<Class>, name: &Rc<LoxString>) -> Result<(), LoxError> {
        let method = class.methods.borrow().get(name).cloned();
        match method {
            Some(Value::Closure(method)) => {
                let receiver = self.pop()?;
                self.push(Value::BoundMethod(Rc::new(BoundMethod { receiver, method })));
                Ok(())
            }
            Some(_) => Err(errors::runtime("Class method must be a closure.")),
            None => Err(errors::runtime(format!("Undefined property '{}'.", name))),
        }
    }

    // ---- upvalues ----

    /// Finds the open upvalue for a stack slot, or inserts a new one at
    /// its sorted position. Sharing is what makes sibling closures see
    /// each other's writes to a captured variable.
    fn capture_upvalue(&mut self, stack_index: usize) -> Rc<RefCell<Upvalue>> {
        let mut insert_at = self.open_upvalues.len();
        for (position, existing) in self.open_upvalues.iter().enumerate() {
            match existing.borrow().stack_index() {
                Some(index) if index > stack_index => continue,
                Some(index) if index == stack_index => return Rc::clone(existing),
                _ => {
                    insert_at = position;
                    break;
                }
            }
        }

        let upvalue = Rc::new(RefCell::new(Upvalue::Open(stack_index)));
        self.open_upvalues.insert(insert_at, upvalue.clone());
        upvalue
    }

    /// Closes every open upvalue at or above `last_index`: the stack slot
    /// moves into the upvalue, which drops off the open list.
    fn close_upvalues(&mut self, last_index: usize) -> Result<(), LoxError> {
        loop {
            let index = match self.open_upvalues.first() {
                Some(upvalue) => match upvalue.borrow().stack_index() {
                    Some(index) if index >= last_index => index,
                    _ => break,
                },
                None => break,
            };

            let upvalue = self.open_upvalues.remove(0);
            let value = self.stack.get(index).cloned().ok_or_else(|| {
                errors::runtime("Upvalue references a missing stack slot.")
            })?;
            *upvalue.borrow_mut() = Upvalue::Closed(value);
        }

        Ok(())
    }
}

impl Default for VM {
    fn default() -> Self {
        let mut strings = StringPool::default();
        let init_string = strings.intern("init");

        Self {
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::default(),
            strings,
            open_upvalues: Vec::new(),
            init_string,
            output: Box::new(std::io::stdout()),
        }
        .with_native("clock", 0, |_args| {
            let now = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map_err(|_| errors::runtime("System time is set before the Unix epoch."))?;
            Ok(Value::Number(now.as_secs_f64()))
        })
    }
}
