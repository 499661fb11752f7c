//! Semantic analysis
//!
//! A single top-down walk over the AST. Declarations populate the symbol
//! table, every expression is given a type, and each rule violation is
//! recorded as a diagnostic before the walk carries on. An expression whose
//! type can't be determined (because something in it was undeclared or
//! already wrong) types as `None`, and `None` never produces a second
//! diagnostic further up the tree.

use crate::{
    frontend::ast::{
        Body, ConstDecl, Expression, ExpressionKind, FunctionDecl, Identifier, LValue,
        LValueKind, Program, Statement, StatementKind, TypeDecl, TypeExpr, TypeExprKind, VarDecl,
    },
    middle::{
        diagnostic::{Diagnostic, DiagnosticKind, report},
        primitive::PrimitiveKind,
        symbol_table::{Symbol, SymbolKind, SymbolTable},
        ty::Type,
    },
};

/// Result of analyzing one program
#[derive(Debug)]
pub struct Analysis {
    pub symbol_table: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    /// Code generation may only run on a successful analysis
    pub fn is_success(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[derive(Debug)]
pub struct SemanticAnalyzer {
    table: SymbolTable,
    diagnostics: Vec<Diagnostic>,
}

impl SemanticAnalyzer {
    pub fn analyze(program: &Program) -> Analysis {
        let mut analyzer = Self {
            table: SymbolTable::new(),
            diagnostics: Vec::new(),
        };

        analyzer.declare(&program.name, SymbolKind::Program, Some(Type::Void), |_| {});
        analyzer.analyze_body(&program.body);

        tracing::debug!(
            symbols = analyzer.table.len(),
            diagnostics = analyzer.diagnostics.len(),
            "semantic analysis finished"
        );

        Analysis {
            symbol_table: analyzer.table,
            diagnostics: analyzer.diagnostics,
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::trace!(%diagnostic, "reported");
        self.diagnostics.push(diagnostic);
    }

    /// Declares a name in the current scope, letting `fill` set the kind
    /// specific attributes. A duplicate is reported and the first declaration
    /// stays in place.
    fn declare(
        &mut self,
        name: &Identifier,
        kind: SymbolKind,
        declared_type: Option<Type>,
        fill: impl FnOnce(&mut Symbol),
    ) -> bool {
        let error = match self.table.declare(&name.name, kind, declared_type, name.line) {
            Ok(symbol) => {
                fill(symbol);
                return true;
            }
            Err(error) => error,
        };

        report!(
            self,
            DiagnosticKind::DuplicateDeclaration,
            name.line,
            "{error}"
        );

        false
    }

    fn analyze_body(&mut self, body: &Body) {
        for constant in &body.consts {
            self.analyze_const(constant);
        }

        for type_decl in &body.types {
            self.analyze_type_decl(type_decl);
        }

        for var_decl in &body.vars {
            self.analyze_var_decl(var_decl, SymbolKind::Variable);
        }

        for function in &body.functions {
            self.analyze_function(function);
        }

        self.analyze_statements(&body.statements);
    }

    fn analyze_const(&mut self, constant: &ConstDecl) {
        let ty = Type::Primitive(PrimitiveKind::of_literal(&constant.value.kind));

        self.declare(&constant.name, SymbolKind::Constant, Some(ty), |symbol| {
            symbol.value = Some(constant.value.kind.clone());
        });
    }

    fn analyze_type_decl(&mut self, type_decl: &TypeDecl) {
        let ty = self.resolve_type(&type_decl.ty);

        self.declare(&type_decl.name, SymbolKind::Type, ty, fill_shape);
    }

    fn analyze_var_decl(&mut self, var_decl: &VarDecl, kind: SymbolKind) {
        let ty = self.resolve_type(&var_decl.ty);

        for name in &var_decl.names {
            self.declare(name, kind, ty.clone(), fill_shape);
        }
    }

    fn analyze_function(&mut self, function: &FunctionDecl) {
        // The signature is resolved in the enclosing scope, and the function
        // is visible there before its own scope opens
        let return_type = self.resolve_type(&function.return_type);

        let mut parameters = Vec::new();
        for parameter in &function.parameters {
            let ty = self.resolve_type(&parameter.ty);

            for name in &parameter.names {
                parameters.push((ty.clone(), name.clone()));
            }
        }

        self.declare(
            &function.name,
            SymbolKind::Function,
            return_type.clone(),
            |symbol| {
                symbol.parameters = parameters
                    .iter()
                    .map(|(ty, name)| (ty.clone(), name.name.clone()))
                    .collect();
                symbol.return_type = return_type;
            },
        );

        self.table.enter_scope(function.name.name.clone());

        for (order, (ty, name)) in parameters.into_iter().enumerate() {
            self.declare(&name, SymbolKind::Parameter, ty, |symbol| {
                symbol.order = Some(order + 1);
                fill_shape(symbol);
            });
        }

        for local in &function.locals {
            self.analyze_var_decl(local, SymbolKind::Variable);
        }

        self.analyze_statements(&function.statements);

        self.table.exit_scope();
    }

    fn resolve_type(&mut self, type_expr: &TypeExpr) -> Option<Type> {
        match &type_expr.kind {
            TypeExprKind::Simple(name) => {
                if let Ok(primitive) = name.name.parse::<PrimitiveKind>() {
                    return Some(Type::Primitive(primitive));
                }

                let Some(symbol) = self.table.lookup(&name.name, None) else {
                    report!(
                        self,
                        DiagnosticKind::UndeclaredIdentifier,
                        name.line,
                        "type `{}` is not declared",
                        name.name
                    );
                    return None;
                };

                if symbol.kind != SymbolKind::Type {
                    let kind = symbol.kind;
                    report!(
                        self,
                        DiagnosticKind::InvalidTarget,
                        name.line,
                        "`{}` is a {kind}, not a type",
                        name.name
                    );
                    return None;
                }

                // The declaration itself already reported why this is unknown
                let ty = symbol.declared_type.clone()?;

                Some(Type::Named {
                    name: name.name.clone(),
                    ty: Box::new(ty),
                })
            }
            TypeExprKind::Array { size, element } => {
                let element = self.resolve_type(element)?;

                Some(Type::Array {
                    size: *size,
                    element: Box::new(element),
                })
            }
            TypeExprKind::Record(declarations) => {
                let mut fields: Vec<(String, Type)> = Vec::new();
                let mut resolved = true;

                for declaration in declarations {
                    let ty = self.resolve_type(&declaration.ty);

                    for name in &declaration.names {
                        if fields.iter().any(|(field, _)| *field == name.name) {
                            report!(
                                self,
                                DiagnosticKind::DuplicateDeclaration,
                                name.line,
                                "field `{}` is declared twice in the same record",
                                name.name
                            );
                            continue;
                        }

                        match &ty {
                            Some(ty) => fields.push((name.name.clone(), ty.clone())),
                            None => resolved = false,
                        }
                    }
                }

                resolved.then_some(Type::Record { fields })
            }
        }
    }

    fn analyze_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.analyze_statement(statement);
        }
    }

    fn analyze_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Assign { target, value } => {
                let target_type = self.lvalue_type(target);
                let value_type = self.expression_type(value);

                if let (Some(target_type), Some(value_type)) = (target_type, value_type) {
                    if !target_type.is_compatible_with(&value_type) {
                        report!(
                            self,
                            DiagnosticKind::TypeMismatch,
                            statement.line,
                            "cannot assign a value of type `{value_type}` to `{target_type}`"
                        );
                    }
                }
            }
            StatementKind::While { condition, body } => {
                self.check_condition(condition, "while");
                self.analyze_statements(body);
            }
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                self.check_condition(condition, "if");
                self.analyze_statements(positive);

                if let Some(negative) = negative {
                    self.analyze_statements(negative);
                }
            }
            StatementKind::Write(operand) => {
                self.expression_type(operand);
            }
            StatementKind::Read(target) => self.check_read_target(target),
            StatementKind::Block(statements) => self.analyze_statements(statements),
        }
    }

    fn check_condition(&mut self, condition: &Expression, construct: &str) {
        let Some(ty) = self.expression_type(condition) else {
            return;
        };

        if ty.as_primitive() != Some(PrimitiveKind::Boolean) {
            report!(
                self,
                DiagnosticKind::TypeMismatch,
                condition.line,
                "`{construct}` condition must be boolean, found `{ty}`"
            );
        }
    }

    fn check_read_target(&mut self, target: &Identifier) {
        let Some(symbol) = self.table.lookup(&target.name, None) else {
            report!(
                self,
                DiagnosticKind::UndeclaredIdentifier,
                target.line,
                "variable `{}` is not declared",
                target.name
            );
            return;
        };

        if symbol.kind != SymbolKind::Variable {
            let kind = symbol.kind;
            report!(
                self,
                DiagnosticKind::InvalidTarget,
                target.line,
                "cannot read into `{}`, it is a {kind}",
                target.name
            );
        }
    }

    /// Looks up a name that is about to be used as a storage location
    fn lookup_storage(&mut self, name: &Identifier, allow_constants: bool) -> Option<Type> {
        let Some(symbol) = self.table.lookup(&name.name, None) else {
            report!(
                self,
                DiagnosticKind::UndeclaredIdentifier,
                name.line,
                "identifier `{}` is not declared",
                name.name
            );
            return None;
        };

        match symbol.kind {
            SymbolKind::Variable | SymbolKind::Parameter => symbol.declared_type.clone(),
            SymbolKind::Constant if allow_constants => symbol.declared_type.clone(),
            kind => {
                let message = match (kind, allow_constants) {
                    (SymbolKind::Function, true) => {
                        format!("`{}` is a function and must be called", name.name)
                    }
                    (_, true) => format!("`{}` is a {kind}, not a value", name.name),
                    (_, false) => format!("cannot assign to `{}`, it is a {kind}", name.name),
                };

                report!(self, DiagnosticKind::InvalidTarget, name.line, "{message}");
                None
            }
        }
    }

    fn lvalue_type(&mut self, lvalue: &LValue) -> Option<Type> {
        match &lvalue.kind {
            LValueKind::Name(name) => self.lookup_storage(name, false),
            LValueKind::ArrayAccess { array, index } => {
                let array_type = self.lookup_storage(array, false);
                self.element_type(array, array_type, index)
            }
            LValueKind::FieldAccess { base, field } => {
                let base_type = self.lvalue_type(base);
                self.field_type(base_type, field)
            }
        }
    }

    /// Type of `array[index]`, given the type of `array`
    fn element_type(
        &mut self,
        array: &Identifier,
        array_type: Option<Type>,
        index: &Expression,
    ) -> Option<Type> {
        if let Some(index_type) = self.expression_type(index) {
            if index_type.as_primitive() != Some(PrimitiveKind::Integer) {
                report!(
                    self,
                    DiagnosticKind::TypeMismatch,
                    index.line,
                    "array index must be `integer`, found `{index_type}`"
                );
            }
        }

        let array_type = array_type?;

        match array_type.element_type() {
            Some(element) => Some(element.clone()),
            None => {
                report!(
                    self,
                    DiagnosticKind::InvalidTarget,
                    array.line,
                    "`{}` has type `{array_type}` and cannot be indexed",
                    array.name
                );
                None
            }
        }
    }

    /// Type of `base.field`, given the type of `base`
    fn field_type(&mut self, base_type: Option<Type>, field: &Identifier) -> Option<Type> {
        let base_type = base_type?;

        if !base_type.is_record() {
            report!(
                self,
                DiagnosticKind::InvalidTarget,
                field.line,
                "type `{base_type}` is not a record and has no field `{}`",
                field.name
            );
            return None;
        }

        match base_type.field(&field.name) {
            Some(ty) => Some(ty.clone()),
            None => {
                report!(
                    self,
                    DiagnosticKind::UndeclaredIdentifier,
                    field.line,
                    "record `{base_type}` has no field `{}`",
                    field.name
                );
                None
            }
        }
    }

    fn expression_type(&mut self, expression: &Expression) -> Option<Type> {
        match &expression.kind {
            ExpressionKind::Integer(_) => Some(Type::INTEGER),
            ExpressionKind::Real(_) => Some(Type::REAL),
            ExpressionKind::String(_) => Some(Type::STRING),
            ExpressionKind::Identifier(name) => self.lookup_storage(name, true),
            ExpressionKind::Arithmetic { operator, lhs, rhs } => {
                let lhs_type = self.expression_type(lhs);
                let rhs_type = self.expression_type(rhs);
                let (lhs_type, rhs_type) = (lhs_type?, rhs_type?);

                let result = lhs_type
                    .as_primitive()
                    .zip(rhs_type.as_primitive())
                    .and_then(|(lhs, rhs)| lhs.arithmetic_result(rhs));

                if result.is_none() {
                    report!(
                        self,
                        DiagnosticKind::TypeMismatch,
                        expression.line,
                        "operator `{operator}` cannot be applied to `{lhs_type}` and `{rhs_type}`"
                    );
                }

                result.map(Type::Primitive)
            }
            ExpressionKind::Comparison { lhs, rhs, .. } => {
                // Operands are still checked for their own errors
                self.expression_type(lhs);
                self.expression_type(rhs);

                Some(Type::BOOLEAN)
            }
            ExpressionKind::ArrayAccess { array, index } => {
                let array_type = self.lookup_storage(array, true);
                self.element_type(array, array_type, index)
            }
            ExpressionKind::FieldAccess { base, field } => {
                let base_type = self.expression_type(base);
                self.field_type(base_type, field)
            }
            ExpressionKind::Call {
                function,
                arguments,
            } => self.call_type(function, arguments),
        }
    }

    fn call_type(&mut self, function: &Identifier, arguments: &[Expression]) -> Option<Type> {
        let argument_types = arguments
            .iter()
            .map(|argument| self.expression_type(argument))
            .collect::<Vec<_>>();

        let Some(symbol) = self.table.lookup(&function.name, None).cloned() else {
            report!(
                self,
                DiagnosticKind::UndeclaredIdentifier,
                function.line,
                "function `{}` is not declared",
                function.name
            );
            return None;
        };

        if symbol.kind != SymbolKind::Function {
            report!(
                self,
                DiagnosticKind::InvalidTarget,
                function.line,
                "`{}` is a {} and cannot be called",
                function.name,
                symbol.kind
            );
            return None;
        }

        if symbol.parameters.len() != arguments.len() {
            report!(
                self,
                DiagnosticKind::ArityMismatch,
                function.line,
                "`{}` takes {} argument(s) but {} were given",
                function.name,
                symbol.parameters.len(),
                arguments.len()
            );
        } else {
            for (position, ((parameter_type, parameter), argument_type)) in
                symbol.parameters.iter().zip(&argument_types).enumerate()
            {
                let (Some(parameter_type), Some(argument_type)) = (parameter_type, argument_type)
                else {
                    continue;
                };

                if !parameter_type.is_compatible_with(argument_type) {
                    report!(
                        self,
                        DiagnosticKind::TypeMismatch,
                        arguments[position].line,
                        "argument {} (`{parameter}`) of `{}` expects `{parameter_type}`, found `{argument_type}`",
                        position + 1,
                        function.name
                    );
                }
            }
        }

        symbol.return_type
    }
}

/// Copies array dimensions and record fields of the declared type onto the
/// symbol for reporting
fn fill_shape(symbol: &mut Symbol) {
    if let Some(ty) = &symbol.declared_type {
        symbol.dimensions = ty.dimensions();
        symbol.fields = ty.record_fields().to_vec();
    }
}
