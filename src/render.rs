// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Terminal rendering of stacks.

use crate::tree::{BranchInfo, BranchTree};

use colored::Colorize;

const CURRENT: &str = "◉";
const OTHER: &str = "◯";

/// Render one stack, trunk-most first, indented by depth.
///
/// The current branch is highlighted. Each branch may carry extra detail
/// lines, e.g., its commits, printed right below it.
pub fn render_stack<'a, F>(
    tree: &BranchTree,
    stack: &[BranchInfo<'a>],
    current: &str,
    mut details: F,
) -> String
where
    F: FnMut(&BranchInfo<'a>) -> Vec<String>,
{
    let mut out = String::new();
    for info in stack {
        let depth = tree.ancestors(info.name()).map(Iterator::count).unwrap_or(0);
        let indent = "  ".repeat(depth);
        let line = if info.name() == current {
            format!("{CURRENT} {}", info.name()).green().bold().to_string()
        } else {
            match info {
                BranchInfo::Trunk { name, .. } => format!("{OTHER} {name}").bold().to_string(),
                BranchInfo::NonTrunk { name, .. } => format!("{OTHER} {name}"),
            }
        };
        out.push_str(&format!("{indent}{line}\n"));

        for detail in details(info) {
            out.push_str(&format!("{indent}  {}\n", detail.dimmed()));
        }
    }

    out
}

/// Render several stacks separated by blank lines.
pub fn render_stacks<'a, F>(
    tree: &BranchTree,
    stacks: &[Vec<BranchInfo<'a>>],
    current: &str,
    mut details: F,
) -> String
where
    F: FnMut(&BranchInfo<'a>) -> Vec<String>,
{
    stacks
        .iter()
        .map(|stack| render_stack(tree, stack, current, &mut details))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn tree() -> BranchTree {
        BranchTree::from_parts(
            "main",
            [("A", "main"), ("B", "A"), ("C", "A"), ("X", "main")]
                .into_iter()
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn render_stack_by_depth() {
        colored::control::set_override(false);
        let tree = tree();
        let stack = tree.stack("A", true).unwrap().collect::<Vec<_>>();

        let result = render_stack(&tree, &stack, "B", |_| Vec::new());
        let expect = indoc! {"
            ◯ main
              ◯ A
                ◉ B
                ◯ C
        "};
        assert_eq!(result, expect);
    }

    #[test]
    fn render_stacks_with_details() {
        colored::control::set_override(false);
        let tree = tree();
        let stacks = tree.stacks();

        let result = render_stacks(&tree, &stacks, "main", |info| match info {
            BranchInfo::Trunk { .. } => Vec::new(),
            BranchInfo::NonTrunk { name, .. } => vec![format!("abc1234 work on {name}")],
        });
        let expect = indoc! {"
            ◉ main
              ◯ A
                abc1234 work on A
                ◯ B
                  abc1234 work on B
                ◯ C
                  abc1234 work on C

            ◉ main
              ◯ X
                abc1234 work on X
        "};
        assert_eq!(result, expect);
    }
}
