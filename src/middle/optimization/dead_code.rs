use hashbrown::HashSet;

use crate::middle::ir::{Address, Instruction};

/// Every address an instruction reads when it runs. Storing into `a[i]`
/// reads `i`, and so does loading from it.
fn reads(instruction: &Instruction) -> Vec<&Address> {
    let mut reads = Vec::new();

    for source in instruction.sources() {
        reads.push(source);
        reads.extend(source.index_operands());
    }

    for operand in instruction.operands() {
        if instruction.sources().contains(&operand) {
            continue;
        }

        reads.extend(operand.index_operands());
    }

    reads
}

/// Removes pure instructions whose destination is never read.
///
/// Liveness is approximated by storage name over the whole listing, with no
/// regard for control flow: a variable written anywhere and read anywhere
/// keeps all of its writes. Labels and jumps are always kept, even when
/// nothing jumps to a label anymore.
pub fn eliminate_dead_code(instructions: &[Instruction]) -> Vec<Instruction> {
    let mut necessary = instructions
        .iter()
        .map(|instruction| instruction.opcode().is_effectful())
        .collect::<Vec<_>>();
    let mut propagated = vec![false; instructions.len()];
    let mut used: HashSet<String> = HashSet::new();

    let mut pass = 0;

    loop {
        let mut changed = false;
        pass += 1;

        for (i, instruction) in instructions.iter().enumerate() {
            if !necessary[i] {
                let Some(destination) = instruction.destination().and_then(Address::storage)
                else {
                    continue;
                };

                if !used.contains(&destination) {
                    continue;
                }

                necessary[i] = true;
            }

            if !propagated[i] {
                used.extend(reads(instruction).into_iter().filter_map(Address::storage));
                propagated[i] = true;
                changed = true;
            }
        }

        tracing::trace!(pass, used = used.len(), "dead code elimination pass");

        if !changed {
            break;
        }
    }

    instructions
        .iter()
        .zip(necessary)
        .filter_map(|(instruction, necessary)| necessary.then(|| instruction.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::ir::parse_listing;

    fn optimize(listing: &str) -> Vec<String> {
        let instructions = parse_listing(listing).unwrap();

        eliminate_dead_code(&instructions)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn keeps_chain_feeding_a_write() {
        assert_eq!(
            optimize("MOV TEMP1 10\nMOV x TEMP1\nWRITE x"),
            vec!["MOV TEMP1 10", "MOV x TEMP1", "WRITE x"]
        );
    }

    #[test]
    fn removes_dead_assignment_and_its_literal_load() {
        assert_eq!(
            optimize("MOV TEMP1 1\nMOV x TEMP1\nMOV TEMP2 2\nMOV y TEMP2\nWRITE x"),
            vec!["MOV TEMP1 1", "MOV x TEMP1", "WRITE x"]
        );
    }

    #[test]
    fn chains_resolve_regardless_of_order() {
        // The use of `y` comes before its definition in program order, as it
        // would inside a loop
        assert_eq!(
            optimize(
                "LBL LABEL1\nWRITE y\nMOV TEMP1 a\nADD TEMP2 TEMP1 b\nMOV y TEMP2\nJMP LABEL1\nMOV z a"
            ),
            vec![
                "LBL LABEL1",
                "WRITE y",
                "MOV TEMP1 a",
                "ADD TEMP2 TEMP1 b",
                "MOV y TEMP2",
                "JMP LABEL1"
            ]
        );
    }

    #[test]
    fn conditions_and_arguments_are_reads() {
        assert_eq!(
            optimize(
                "MOV TEMP1 0\nGTR TEMP2 x TEMP1\nJNZ TEMP2 LABEL1\nMOV TEMP3 5\nPUSH TEMP3\nCALL FUNC_f\nPOP TEMP4\nMOV y TEMP4\nLBL LABEL1"
            ),
            vec![
                "MOV TEMP1 0",
                "GTR TEMP2 x TEMP1",
                "JNZ TEMP2 LABEL1",
                "MOV TEMP3 5",
                "PUSH TEMP3",
                "CALL FUNC_f",
                "POP TEMP4",
                "LBL LABEL1"
            ]
        );
    }

    #[test]
    fn element_stores_keep_their_index() {
        assert_eq!(
            optimize(
                "MOV TEMP1 2\nMOV TEMP2 7\nMOV a[TEMP1] TEMP2\nMOV TEMP3 9\nMOV b[TEMP3] TEMP1\nMOV TEMP4 a[i]\nWRITE TEMP4"
            ),
            vec![
                "MOV TEMP1 2",
                "MOV TEMP2 7",
                "MOV a[TEMP1] TEMP2",
                "MOV TEMP4 a[i]",
                "WRITE TEMP4"
            ]
        );
    }

    #[test]
    fn record_fields_track_their_root_variable() {
        assert_eq!(
            optimize("MOV TEMP1 1.5\nMOV p.x TEMP1\nMOV TEMP2 p.y\nWRITE TEMP2"),
            vec!["MOV TEMP1 1.5", "MOV p.x TEMP1", "MOV TEMP2 p.y", "WRITE TEMP2"]
        );
    }

    #[test]
    fn unused_pure_code_disappears_entirely() {
        assert!(optimize("MOV TEMP1 1\nADD TEMP2 TEMP1 TEMP1\nMOV x TEMP2").is_empty());
        assert!(optimize("").is_empty());
    }

    #[test]
    fn running_twice_changes_nothing() {
        let listing = "LBL FUNC_f\nMOV TEMP1 a\nMOV r TEMP1\nMOV q r\nWRITE r\nRET\nMOV TEMP2 5\nPUSH TEMP2\nCALL FUNC_f\nPOP TEMP3\nMOV y TEMP3\nMOV z y";
        let instructions = parse_listing(listing).unwrap();

        let once = eliminate_dead_code(&instructions);
        let twice = eliminate_dead_code(&once);

        assert_eq!(once, twice);
        assert!(once.len() <= instructions.len());
    }
}
