//! Tree rendering of a tag sample

use super::{PathInfo, TagSample};
use crate::colors::{ansi, paint};

/// Values shown inline before the list is elided
const INLINE_VALUES: usize = 5;

/// Tree node for display
#[derive(Default)]
struct TreeNode<'a> {
    children: Vec<(&'a str, TreeNode<'a>)>,
    info: Option<&'a PathInfo>,
}

impl<'a> TreeNode<'a> {
    fn child(&mut self, name: &'a str) -> &mut TreeNode<'a> {
        let pos = match self.children.iter().position(|(n, _)| *n == name) {
            Some(pos) => pos,
            None => {
                self.children.push((name, TreeNode::default()));
                self.children.len() - 1
            }
        };
        &mut self.children[pos].1
    }

    fn descendants(&self) -> usize {
        self.children
            .iter()
            .map(|(_, child)| 1 + child.descendants())
            .sum()
    }
}

impl TagSample {
    /// Format the sampled paths as a tree
    ///
    /// Each line shows the tag, its occurrence count when above one, sample
    /// text values and the attribute names seen on it.
    pub fn format_tree(&self, max_depth: Option<usize>, use_color: bool) -> String {
        let tree = self.build_tree();
        let mut output = String::new();
        let mut truncated = false;
        format_node(&tree, "", true, 0, max_depth, use_color, &mut output, &mut truncated);

        if truncated {
            output.push('\n');
            output.push_str(&paint("(use -d to increase depth)", ansi::DIM, use_color));
            output.push('\n');
        }
        output
    }

    fn build_tree(&self) -> TreeNode<'_> {
        let mut root = TreeNode::default();

        // Sorted paths put parents before their children
        let mut sorted: Vec<_> = self.paths.iter().collect();
        sorted.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (path, info) in sorted {
            let mut node = &mut root;
            for segment in path {
                node = node.child(segment);
            }
            node.info = Some(info);
        }
        root
    }
}

fn summarize(values: &[String]) -> String {
    if values.len() <= INLINE_VALUES {
        values.join(", ")
    } else {
        format!(
            "{}, \u{2026} (+{})",
            values[..INLINE_VALUES].join(", "),
            values.len() - INLINE_VALUES
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn format_node(
    node: &TreeNode<'_>,
    prefix: &str,
    is_root: bool,
    depth: usize,
    max_depth: Option<usize>,
    use_color: bool,
    output: &mut String,
    truncated: &mut bool,
) {
    if let Some(max) = max_depth {
        if depth >= max && !node.children.is_empty() {
            let more = paint(&format!("\u{2026} ({} more)", node.descendants()), ansi::DIM, use_color);
            output.push_str(&format!("{}\u{2514}\u{2500} {}\n", prefix, more));
            *truncated = true;
            return;
        }
    }

    for (i, (name, child)) in node.children.iter().enumerate() {
        let is_last_child = i == node.children.len() - 1;
        let connector = if is_root {
            ""
        } else if is_last_child {
            "\u{2514}\u{2500} "
        } else {
            "\u{251C}\u{2500} "
        };

        let mut line = format!("{}{}{}", prefix, connector, name);
        if let Some(info) = child.info {
            if info.count > 1 {
                line.push_str(&format!(" {}", paint(&format!("({})", info.count), ansi::YELLOW, use_color)));
            }
            if !info.attributes.is_empty() {
                let names: Vec<String> = info.attributes.keys().map(|n| format!("@{}", n)).collect();
                line.push_str(&format!(" {}", paint(&format!("[{}]", names.join(" ")), ansi::CYAN, use_color)));
            }
            if !info.values.is_empty() {
                line.push_str(&format!("  {}", paint(&summarize(&info.values), ansi::DIM, use_color)));
            }
        }
        output.push_str(&line);
        output.push('\n');

        let new_prefix = if is_root {
            String::new()
        } else if is_last_child {
            format!("{}   ", prefix)
        } else {
            format!("{}\u{2502}  ", prefix)
        };
        format_node(child, &new_prefix, false, depth + 1, max_depth, use_color, output, truncated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample(xml: &str) -> TagSample {
        let mut s = TagSample::new();
        s.collect_from_xml_string(xml).unwrap();
        s
    }

    #[test]
    fn test_plain_tree() {
        let s = sample(r#"<r><a id="1">x</a><a id="2">y</a><b/></r>"#);
        assert_eq!(
            s.format_tree(None, false),
            "r\n\u{251C}\u{2500} a (2) [@id]  x, y\n\u{2514}\u{2500} b\n"
        );
    }

    #[test]
    fn test_depth_limit() {
        let s = sample("<r><a><b><c/></b></a></r>");
        let out = s.format_tree(Some(1), false);
        assert!(out.starts_with("r\n\u{2514}\u{2500} \u{2026} (3 more)\n"));
        assert!(out.contains("use -d"));
    }

    #[test]
    fn test_many_values_elided() {
        let items: String = (0..8).map(|i| format!("<i>{}</i>", i)).collect();
        let out = sample(&format!("<r>{}</r>", items)).format_tree(None, false);
        assert!(out.contains("0, 1, 2, 3, 4, \u{2026} (+3)"));
    }

    #[test]
    fn test_color_codes() {
        let out = sample("<r><a k='v'/><a/></r>").format_tree(None, true);
        assert!(out.contains(ansi::YELLOW));
        assert!(out.contains(ansi::CYAN));
    }
}
