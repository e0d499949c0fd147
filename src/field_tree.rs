use super::*;
use itertools::Itertools;

/// The parent/child relations between field tags, as declared by the field control field
/// of a lead record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldTree {
    pub roots: Vec<FieldNode>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldNode {
    pub tag: String,
    pub children: Vec<FieldNode>,
}
impl FieldNode {
    fn leaf(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            children: Vec::new(),
        }
    }

    fn insert(&mut self, parent: &str, child: &str) -> bool {
        if self.tag == parent {
            self.children.push(Self::leaf(child));
            true
        } else {
            self.children.iter_mut().any(|c| c.insert(parent, child))
        }
    }

    fn find(&self, tag: &str) -> Option<&FieldNode> {
        if self.tag == tag {
            Some(self)
        } else {
            self.children.iter().find_map(|c| c.find(tag))
        }
    }

    fn tree_string_prefixed(&self, prefix: &str) -> String {
        if self.children.is_empty() {
            format!("{prefix}|- {}", self.tag)
        } else {
            let child_prefix = format!("{prefix}   ");
            format!(
                "{prefix}|-{}\n{}",
                self.tag,
                self.children
                    .iter()
                    .map(|child| child.tree_string_prefixed(&child_prefix))
                    .join("\n")
            )
        }
    }
}

impl FieldTree {
    /// Parse concatenated (parent, child) tag pairs of `tag_length` bytes each.
    ///
    /// A parent that is not in the tree yet starts a new root.
    pub fn parse_from_str(input: &str, tag_length: usize) -> Result<Self> {
        Iso8211Error::assert_format(
            || input.is_ascii() && tag_length > 0 && input.len() % (2 * tag_length) == 0,
            || format!("'{input}' is not a list of tag pairs of length {tag_length}"),
        )?;
        let mut tree = Self::default();
        let mut remaining = input;
        while !remaining.is_empty() {
            let (parent, rest) = remaining.split_at(tag_length);
            let (child, rest) = rest.split_at(tag_length);
            remaining = rest;
            if !tree.roots.iter_mut().any(|root| root.insert(parent, child)) {
                let mut root = FieldNode::leaf(parent);
                root.children.push(FieldNode::leaf(child));
                tree.roots.push(root);
            }
        }
        Ok(tree)
    }

    pub fn root_tags(&self) -> Vec<&str> {
        self.roots.iter().map(|r| r.tag.as_str()).collect()
    }

    /// Direct children of the first node tagged `tag`.
    pub fn children_of(&self, tag: &str) -> Option<Vec<&str>> {
        self.roots.iter().find_map(|r| r.find(tag)).map(|node| {
            node.children
                .iter()
                .map(|c| c.tag.as_str())
                .collect()
        })
    }

    pub fn tree_string(&self) -> String {
        if self.roots.is_empty() {
            return "|".to_string();
        }
        self.roots
            .iter()
            .map(|root| root.tree_string_prefixed(""))
            .join("\n")
    }
}
impl fmt::Display for FieldTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tree_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_field_tree() {
        let test_str = "0001DSIDDSIDDSSI0001DSPM0001VRIDVRIDATTVVRIDVRPCVRIDVRPTVRIDSGCCVRIDSG2DVRIDSG3D0001FRIDFRIDFOIDFRIDATTFFRIDNATFFRIDFFPCFRIDFFPTFRIDFSPCFRIDFSPT";
        let tree = FieldTree::parse_from_str(test_str, 4).unwrap();
        assert_eq!(vec!["0001"], tree.root_tags());
        assert_eq!(
            Some(vec!["DSID", "DSPM", "VRID", "FRID"]),
            tree.children_of("0001")
        );
        assert_eq!(Some(vec!["DSSI"]), tree.children_of("DSID"));
        assert_eq!(
            Some(vec!["FOID", "ATTF", "NATF", "FFPC", "FFPT", "FSPC", "FSPT"]),
            tree.children_of("FRID")
        );
        assert_eq!(Some(vec![]), tree.children_of("SG2D"));
        assert_eq!(None, tree.children_of("XXXX"));
    }

    #[test]
    fn separate_roots() {
        let tree = FieldTree::parse_from_str("0001CATD0002ABCD", 4).unwrap();
        assert_eq!(vec!["0001", "0002"], tree.root_tags());
    }

    #[test]
    fn tree_rendering() {
        let tree = FieldTree::parse_from_str("0001DSIDDSIDDSSI0001DSPM", 4).unwrap();
        assert_eq!(
            "|-0001\n   |-DSID\n      |- DSSI\n   |- DSPM",
            tree.to_string()
        );
        assert_eq!("|", FieldTree::default().to_string());
    }

    #[test]
    fn uneven_tag_pairs() {
        let err = FieldTree::parse_from_str("0001DSIDDSI", 4).unwrap_err();
        assert_eq!(ErrorKind::MalformedFormat, err.kind());
    }
}
