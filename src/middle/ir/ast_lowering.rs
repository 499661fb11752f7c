//! Lowering from the AST to three-address IR.
//!
//! Expressions are lowered post-order: operands first, then one instruction
//! writing a fresh temporary. Only ever run on programs that passed semantic
//! analysis.

use crate::{
    frontend::ast::{
        ArithmeticOperator, ComparisonOperator, Expression, ExpressionKind, FunctionDecl,
        LValue, LValueKind, Program, Statement, StatementKind,
    },
    middle::ir::{Address, BinaryOperator, Instruction},
};

#[derive(Debug)]
pub struct IrGenerator {
    instructions: Vec<Instruction>,
    /* Counters are per run, so TEMP1 and LABEL1 are always the first ones */
    temp_count: u32,
    label_count: u32,
}

impl IrGenerator {
    pub fn generate(program: &Program) -> Vec<Instruction> {
        let mut generator = Self {
            instructions: Vec::new(),
            temp_count: 0,
            label_count: 0,
        };

        // Declarations produce no code. Functions come first, followed by
        // the main program's statements.
        for function in &program.body.functions {
            generator.lower_function(function);
        }

        generator.lower_statements(&program.body.statements);

        tracing::debug!(
            instructions = generator.instructions.len(),
            temps = generator.temp_count,
            labels = generator.label_count,
            "generated IR"
        );

        generator.instructions
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn new_temp(&mut self) -> Address {
        self.temp_count += 1;
        Address::Temp(self.temp_count)
    }

    fn new_label(&mut self) -> Address {
        self.label_count += 1;
        Address::Label(self.label_count)
    }

    fn lower_function(&mut self, function: &FunctionDecl) {
        self.emit(Instruction::Label {
            label: Address::Function(function.name.name.clone()),
        });

        self.lower_statements(&function.statements);

        self.emit(Instruction::Return);
    }

    fn lower_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.lower_statement(statement);
        }
    }

    fn lower_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Assign { target, value } => {
                let source = self.lower_expression(value);
                let destination = self.lower_place(target);

                self.emit(Instruction::Move {
                    destination,
                    source,
                });
            }
            StatementKind::While { condition, body } => {
                let start = self.new_label();
                let body_label = self.new_label();
                let end = self.new_label();

                self.emit(Instruction::Label {
                    label: start.clone(),
                });

                let condition = self.lower_expression(condition);
                self.emit(Instruction::JumpIfNonZero {
                    condition,
                    target: body_label.clone(),
                });
                self.emit(Instruction::Jump {
                    target: end.clone(),
                });

                self.emit(Instruction::Label { label: body_label });
                self.lower_statements(body);
                self.emit(Instruction::Jump { target: start });

                self.emit(Instruction::Label { label: end });
            }
            StatementKind::If {
                condition,
                positive,
                negative,
            } => {
                let condition = self.lower_expression(condition);
                let then_label = self.new_label();
                let end = self.new_label();

                self.emit(Instruction::JumpIfNonZero {
                    condition,
                    target: then_label.clone(),
                });

                // The else arm falls through from the conditional jump
                if let Some(negative) = negative {
                    self.lower_statements(negative);
                }
                self.emit(Instruction::Jump {
                    target: end.clone(),
                });

                self.emit(Instruction::Label { label: then_label });
                self.lower_statements(positive);

                self.emit(Instruction::Label { label: end });
            }
            StatementKind::Write(operand) => {
                let operand = match &operand.kind {
                    ExpressionKind::Integer(value) => Address::Integer(*value),
                    ExpressionKind::Real(value) => Address::Real(*value),
                    ExpressionKind::String(value) => Address::String(value.clone()),
                    ExpressionKind::Identifier(name) => Address::Variable(name.name.clone()),
                    _ => self.lower_expression(operand),
                };

                self.emit(Instruction::Write { operand });
            }
            StatementKind::Read(target) => self.emit(Instruction::Read {
                target: Address::Variable(target.name.clone()),
            }),
            StatementKind::Block(statements) => self.lower_statements(statements),
        }
    }

    /// Address of an assignable location. Index expressions are lowered on
    /// the way.
    fn lower_place(&mut self, lvalue: &LValue) -> Address {
        match &lvalue.kind {
            LValueKind::Name(name) => Address::Variable(name.name.clone()),
            LValueKind::ArrayAccess { array, index } => Address::Element {
                array: array.name.clone(),
                index: Box::new(self.lower_expression(index)),
            },
            LValueKind::FieldAccess { base, field } => Address::Field {
                base: Box::new(self.lower_place(base)),
                field: field.name.clone(),
            },
        }
    }

    fn lower_binary(&mut self, operator: BinaryOperator, lhs: Address, rhs: Address) -> Address {
        let destination = self.new_temp();

        self.emit(Instruction::BinaryOperation {
            operator,
            destination: destination.clone(),
            lhs,
            rhs,
        });

        destination
    }

    /// Lowers an expression and returns the address holding its value
    fn lower_expression(&mut self, expression: &Expression) -> Address {
        match &expression.kind {
            ExpressionKind::Integer(_) | ExpressionKind::Real(_) => {
                let source = match expression.kind {
                    ExpressionKind::Real(value) => Address::Real(value),
                    ExpressionKind::Integer(value) => Address::Integer(value),
                    _ => unreachable!(),
                };
                let destination = self.new_temp();

                self.emit(Instruction::Move {
                    destination: destination.clone(),
                    source,
                });

                destination
            }
            ExpressionKind::String(value) => Address::String(value.clone()),
            ExpressionKind::Identifier(name) => Address::Variable(name.name.clone()),
            ExpressionKind::Arithmetic { operator, lhs, rhs } => {
                let lhs = self.lower_expression(lhs);
                let rhs = self.lower_expression(rhs);

                let operator = match operator {
                    ArithmeticOperator::Add => BinaryOperator::Add,
                    ArithmeticOperator::Subtract => BinaryOperator::Sub,
                    ArithmeticOperator::Multiply => BinaryOperator::Mul,
                    ArithmeticOperator::Divide => BinaryOperator::Div,
                };

                self.lower_binary(operator, lhs, rhs)
            }
            ExpressionKind::Comparison { operator, lhs, rhs } => {
                let lhs = self.lower_expression(lhs);
                let rhs = self.lower_expression(rhs);

                match operator {
                    ComparisonOperator::Equal => self.lower_binary(BinaryOperator::Eql, lhs, rhs),
                    ComparisonOperator::NotEqual => {
                        self.lower_binary(BinaryOperator::Neq, lhs, rhs)
                    }
                    ComparisonOperator::LessThan => {
                        self.lower_binary(BinaryOperator::Les, lhs, rhs)
                    }
                    ComparisonOperator::GreaterThan => {
                        self.lower_binary(BinaryOperator::Gtr, lhs, rhs)
                    }
                    // a <= b is !(a > b), and a >= b is !(a < b)
                    ComparisonOperator::LessThanOrEqualTo => {
                        let greater = self.lower_binary(BinaryOperator::Gtr, lhs, rhs);
                        self.lower_binary(BinaryOperator::Eql, greater, Address::Integer(0))
                    }
                    ComparisonOperator::GreaterThanOrEqualTo => {
                        let less = self.lower_binary(BinaryOperator::Les, lhs, rhs);
                        self.lower_binary(BinaryOperator::Eql, less, Address::Integer(0))
                    }
                }
            }
            ExpressionKind::ArrayAccess { array, index } => {
                let source = Address::Element {
                    array: array.name.clone(),
                    index: Box::new(self.lower_expression(index)),
                };

                self.load(source)
            }
            ExpressionKind::FieldAccess { base, field } => {
                let base = match &base.kind {
                    ExpressionKind::ArrayAccess { array, index } => Address::Element {
                        array: array.name.clone(),
                        index: Box::new(self.lower_expression(index)),
                    },
                    ExpressionKind::Identifier(name) => Address::Variable(name.name.clone()),
                    _ => self.lower_expression(base),
                };

                self.load(Address::Field {
                    base: Box::new(base),
                    field: field.name.clone(),
                })
            }
            ExpressionKind::Call {
                function,
                arguments,
            } => {
                for argument in arguments {
                    let operand = self.lower_expression(argument);
                    self.emit(Instruction::Push { operand });
                }

                self.emit(Instruction::Call {
                    target: Address::Function(function.name.clone()),
                });

                let destination = self.new_temp();
                self.emit(Instruction::Pop {
                    destination: destination.clone(),
                });

                destination
            }
        }
    }

    /// Copies a composite location into a fresh temporary
    fn load(&mut self, source: Address) -> Address {
        let destination = self.new_temp();

        self.emit(Instruction::Move {
            destination: destination.clone(),
            source,
        });

        destination
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        frontend::{SourceFile, lexer::Lexer, parser::Parser},
        middle::{
            ir::{Opcode, listing, parse_listing},
            semantic::SemanticAnalyzer,
        },
    };

    fn generate(source: &str) -> Vec<Instruction> {
        let tokens = Lexer::tokenize(&SourceFile::from_memory(source)).unwrap();
        let program = Parser::parse_program(tokens).unwrap();

        let analysis = SemanticAnalyzer::analyze(&program);
        assert!(analysis.is_success(), "{:?}", analysis.diagnostics);

        IrGenerator::generate(&program)
    }

    fn lines(instructions: &[Instruction]) -> Vec<String> {
        instructions.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn assignment_loads_literal_then_moves() {
        let instructions = generate("program p; var x: integer; begin x := 10; write(x) end");

        assert_eq!(
            lines(&instructions),
            vec!["MOV TEMP1 10", "MOV x TEMP1", "WRITE x"]
        );
    }

    #[test]
    fn arithmetic_is_post_order() {
        let instructions = generate(indoc! {"
            program p;
            var a, b: integer;
            begin
                a := b + 2 * a
            end
        "});

        assert_eq!(
            lines(&instructions),
            vec![
                "MOV TEMP1 2",
                "MUL TEMP2 TEMP1 a",
                "ADD TEMP3 b TEMP2",
                "MOV a TEMP3"
            ]
        );
    }

    #[test]
    fn while_loop_retests_every_iteration() {
        let instructions = generate(indoc! {"
            program p;
            var x: integer;
            begin
                while x > 0 begin
                    x := x - 1
                end
            end
        "});

        assert_eq!(
            lines(&instructions),
            vec![
                "LBL LABEL1",
                "MOV TEMP1 0",
                "GTR TEMP2 x TEMP1",
                "JNZ TEMP2 LABEL2",
                "JMP LABEL3",
                "LBL LABEL2",
                "MOV TEMP3 1",
                "SUB TEMP4 x TEMP3",
                "MOV x TEMP4",
                "JMP LABEL1",
                "LBL LABEL3"
            ]
        );
    }

    #[test]
    fn if_else_emits_else_arm_first() {
        let instructions = generate(indoc! {r#"
            program p;
            var x: integer;
            begin
                if x = 1 then begin write("one") end else begin write("other") end
            end
        "#});

        assert_eq!(
            lines(&instructions),
            vec![
                "MOV TEMP1 1",
                "EQL TEMP2 x TEMP1",
                "JNZ TEMP2 LABEL1",
                "WRITE \"other\"",
                "JMP LABEL2",
                "LBL LABEL1",
                "WRITE \"one\"",
                "LBL LABEL2"
            ]
        );
    }

    #[test]
    fn if_without_else_jumps_to_end() {
        let instructions = generate(indoc! {"
            program p;
            var x: integer;
            begin
                if x <> 1 then begin x := 1 end
            end
        "});

        let opcodes = instructions.iter().map(Instruction::opcode).collect::<Vec<_>>();
        assert_eq!(
            opcodes,
            vec![
                Opcode::Mov,
                Opcode::Neq,
                Opcode::Jnz,
                Opcode::Jmp,
                Opcode::Lbl,
                Opcode::Mov,
                Opcode::Mov,
                Opcode::Lbl
            ]
        );
    }

    #[test]
    fn inclusive_comparisons_negate_the_strict_opposite() {
        let instructions = generate(indoc! {"
            program p;
            var a, b: integer;
            begin
                write(a <= b);
                write(a >= b)
            end
        "});

        assert_eq!(
            lines(&instructions),
            vec![
                "GTR TEMP1 a b",
                "EQL TEMP2 TEMP1 0",
                "WRITE TEMP2",
                "LES TEMP3 a b",
                "EQL TEMP4 TEMP3 0",
                "WRITE TEMP4"
            ]
        );
    }

    #[test]
    fn calls_push_arguments_then_pop_result() {
        let instructions = generate(indoc! {"
            program p;
            var y: integer;
            function f(a: integer): integer
            var r: integer;
            begin
                r := a;
                write(r)
            end
            begin
                y := f(5)
            end
        "});

        assert_eq!(
            lines(&instructions),
            vec![
                "LBL FUNC_f",
                "MOV r a",
                "WRITE r",
                "RET",
                "MOV TEMP1 5",
                "PUSH TEMP1",
                "CALL FUNC_f",
                "POP TEMP2",
                "MOV y TEMP2"
            ]
        );
    }

    #[test]
    fn composite_addresses_for_arrays_of_records() {
        let instructions = generate(indoc! {"
            program p;
            type point := record x, y: real; end;
            var route: array [10] of point; i: integer; r: real;
            begin
                route[i].x := 1.5;
                r := route[2].y
            end
        "});

        assert_eq!(
            lines(&instructions),
            vec![
                "MOV TEMP1 1.5",
                "MOV route[i].x TEMP1",
                "MOV TEMP2 2",
                "MOV TEMP3 route[TEMP2].y",
                "MOV r TEMP3"
            ]
        );
    }

    #[test]
    fn generated_listing_parses_back() {
        let instructions = generate(indoc! {r#"
            program p;
            type point := record x, y: real; end;
            var route: array [10] of point; i: integer;
            function f(a, b: integer): integer
            begin
                write("in f")
            end
            begin
                read(i);
                while i >= 0 begin
                    route[i].x := f(i, 2) / 2.5;
                    i := i - 1
                end;
                write("done, bye")
            end
        "#});

        assert_eq!(parse_listing(&listing(&instructions)), Ok(instructions));
    }
}
