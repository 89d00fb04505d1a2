// Category hierarchy operations.
//
// These functions work on the in-memory collections; persistence happens
// once per top-level call, at the `Library` layer. The father/children
// relation is expected to form a forest, but every walk carries a visited
// set so corrupted persisted data (an accidental cycle) degrades into a
// truncated walk instead of a hang.

use std::collections::{BTreeSet, HashMap, HashSet};

use uuid::Uuid;

use crate::model::{Category, CategoryId, MediaId, MediaRecord};

/// Append a new leaf category, optionally linked under a father.
pub fn add_category(
    categories: &mut Vec<Category>,
    name: &str,
    father: Option<&str>,
) -> Category {
    let mut category = Category::new(Uuid::new_v4().to_string(), name);
    category.order = categories.iter().map(|c| c.order).max().unwrap_or(0) + 1;

    if let Some(father_id) = father {
        if let Some(parent) = categories.iter_mut().find(|c| c.id == father_id) {
            parent.children.push(category.id.clone());
            category.father = Some(father_id.to_string());
        }
    }

    categories.push(category.clone());
    category
}

/// Pure rename; membership untouched; unknown id is a no-op.
pub fn rename_category(categories: &mut [Category], id: &str, name: &str) {
    if let Some(category) = categories.iter_mut().find(|c| c.id == id) {
        category.name = name.to_string();
    }
}

/// Rewrite the explicit ordering from the given id sequence. Ids not listed
/// keep their relative order after the listed ones.
pub fn reorder_categories(categories: &mut [Category], ids: &[CategoryId]) {
    let rank: HashMap<&str, i64> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i as i64))
        .collect();
    let mut next = ids.len() as i64;
    for category in categories.iter_mut() {
        category.order = match rank.get(category.id.as_str()) {
            Some(&r) => r,
            None => {
                let r = next;
                next += 1;
                r
            }
        };
    }
}

/// Recursively delete a category and its whole subtree, post-order.
///
/// Folder-bound categories release their member images first (the images
/// survive the folder link going away). Descendants are removed before
/// ancestors, the target is detached from its father, and ids of deleted
/// categories are pruned from surviving images' membership sets in the same
/// pass. Unknown ids are a no-op.
pub fn delete_category(images: &mut [MediaRecord], categories: &mut Vec<Category>, id: &str) {
    let mut visited = HashSet::new();
    delete_subtree(images, categories, id, &mut visited);
    reconcile_membership(images, categories);
}

fn delete_subtree(
    images: &mut [MediaRecord],
    categories: &mut Vec<Category>,
    id: &str,
    visited: &mut HashSet<CategoryId>,
) {
    if !visited.insert(id.to_string()) {
        return;
    }
    let Some(category) = categories.iter().find(|c| c.id == id) else {
        return;
    };

    let member_ids: HashSet<MediaId> = category.images.iter().cloned().collect();
    let children = category.children.clone();
    let father = category.father.clone();
    let is_bound = category.is_bound_to_folder;

    if is_bound {
        for image in images.iter_mut() {
            if member_ids.contains(&image.id) {
                image.is_bound_to_folder = false;
            }
        }
    }

    for child in children {
        delete_subtree(images, categories, &child, visited);
    }

    if let Some(father_id) = father {
        if let Some(parent) = categories.iter_mut().find(|c| c.id == father_id) {
            parent.children.retain(|child| child != id);
        }
    }

    categories.retain(|c| c.id != id);
}

/// Place images into categories: union membership on both sides, then prune
/// redundant memberships along the whole father chain and across the whole
/// descendant subtree, so an image is counted at exactly one nesting level.
pub fn add_to_category(
    images: &mut [MediaRecord],
    categories: &mut [Category],
    image_ids: &BTreeSet<MediaId>,
    category_ids: &[CategoryId],
) {
    let known: HashSet<&str> = categories.iter().map(|c| c.id.as_str()).collect();
    let targets: Vec<CategoryId> = category_ids
        .iter()
        .filter(|id| known.contains(id.as_str()))
        .cloned()
        .collect();
    if targets.is_empty() {
        return;
    }

    // Step 1: images gain the target categories.
    for image in images.iter_mut() {
        if image_ids.contains(&image.id) {
            image.categories.extend(targets.iter().cloned());
        }
    }

    // Step 2: target categories gain the images.
    for category in categories.iter_mut() {
        if targets.contains(&category.id) {
            for id in image_ids {
                if !category.images.contains(id) {
                    category.images.push(id.clone());
                }
            }
            category.recount();
        }
    }

    // Step 3: ancestor pruning, starting at the immediate parent. Placing
    // an image in a nested category removes it from every level above;
    // keeping it in any ancestor would double-count.
    let mut pruned: BTreeSet<CategoryId> = BTreeSet::new();
    for target in &targets {
        for ancestor in collect_ancestors(categories, target) {
            if !targets.contains(&ancestor) {
                pruned.insert(ancestor);
            }
        }
    }

    // Step 4: descendant pruning. Direct placement supersedes any
    // finer-grained sub-category membership.
    for target in &targets {
        for descendant in collect_descendants(categories, target) {
            if !targets.contains(&descendant) {
                pruned.insert(descendant);
            }
        }
    }

    for category in categories.iter_mut() {
        if pruned.contains(&category.id) {
            category.images.retain(|id| !image_ids.contains(id));
            category.recount();
        }
    }
    for image in images.iter_mut() {
        if image_ids.contains(&image.id) {
            image.categories.retain(|c| !pruned.contains(c));
        }
    }

    reconcile_membership(images, categories);
}

/// Ancestor ids of `id`, nearest first, cycle-safe.
pub fn collect_ancestors(categories: &[Category], id: &str) -> Vec<CategoryId> {
    let by_id: HashMap<&str, &Category> =
        categories.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut out = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(id);

    let mut cursor = by_id.get(id).and_then(|c| c.father.as_deref());
    while let Some(ancestor) = cursor {
        if !visited.insert(ancestor) {
            break;
        }
        out.push(ancestor.to_string());
        cursor = by_id.get(ancestor).and_then(|c| c.father.as_deref());
    }
    out
}

/// All transitive descendants of `id`, depth-first, cycle-safe.
pub fn collect_descendants(categories: &[Category], id: &str) -> Vec<CategoryId> {
    let by_id: HashMap<&str, &Category> =
        categories.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut out = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(id);

    let mut stack: Vec<&str> = by_id
        .get(id)
        .map(|c| c.children.iter().map(String::as_str).collect())
        .unwrap_or_default();

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        out.push(current.to_string());
        if let Some(category) = by_id.get(current) {
            stack.extend(category.children.iter().map(String::as_str));
        }
    }
    out
}

/// Re-derive the bidirectional membership invariant:
/// `C.images contains I.id` iff `I.categories contains C.id`.
///
/// Image-side membership is authoritative; category image lists keep their
/// existing order for retained ids and append newcomers in image order.
/// References to categories that no longer exist are dropped.
pub fn reconcile_membership(images: &mut [MediaRecord], categories: &mut [Category]) {
    let known: HashSet<CategoryId> = categories.iter().map(|c| c.id.clone()).collect();
    for image in images.iter_mut() {
        image.categories.retain(|c| known.contains(c));
    }

    for category in categories.iter_mut() {
        let members: Vec<&MediaRecord> = images
            .iter()
            .filter(|img| img.categories.contains(&category.id))
            .collect();
        let member_ids: HashSet<&str> = members.iter().map(|img| img.id.as_str()).collect();

        category.images.retain(|id| member_ids.contains(id.as_str()));
        for member in &members {
            if !category.images.contains(&member.id) {
                category.images.push(member.id.clone());
            }
        }
        category.recount();
    }
}

/// Debug check used by tests: both membership views agree.
#[cfg(test)]
pub fn membership_invariant_holds(images: &[MediaRecord], categories: &[Category]) -> bool {
    for category in categories {
        for id in &category.images {
            let Some(image) = images.iter().find(|img| &img.id == id) else {
                return false;
            };
            if !image.categories.contains(&category.id) {
                return false;
            }
        }
        if category.count != category.images.len() {
            return false;
        }
    }
    for image in images {
        for cat_id in &image.categories {
            let Some(category) = categories.iter().find(|c| &c.id == cat_id) else {
                return false;
            };
            if !category.images.contains(&image.id) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::sample_image;

    fn ids(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    fn image_set(ids: &[&str]) -> BTreeSet<MediaId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    /// Build the chain A -> B -> C with image X initially in A.
    fn chain_fixture() -> (Vec<MediaRecord>, Vec<Category>) {
        let mut categories = Vec::new();
        let a = add_category(&mut categories, "A", None);
        let b = add_category(&mut categories, "B", Some(&a.id));
        let _c = add_category(&mut categories, "C", Some(&b.id));

        let mut images = vec![sample_image("x")];
        let a_id = categories[0].id.clone();
        add_to_category(&mut images, &mut categories, &image_set(&["x"]), &[a_id]);
        (images, categories)
    }

    #[test]
    fn add_category_links_father_and_orders() {
        let mut categories = Vec::new();
        let root = add_category(&mut categories, "root", None);
        let leaf = add_category(&mut categories, "leaf", Some(&root.id));

        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].children, vec![leaf.id.clone()]);
        assert_eq!(leaf.father.as_deref(), Some(root.id.as_str()));
        assert!(leaf.order > categories[0].order);
        assert_eq!(leaf.count, 0);
        assert!(leaf.images.is_empty());
    }

    #[test]
    fn rename_is_pure_and_tolerates_unknown_ids() {
        let mut categories = Vec::new();
        let cat = add_category(&mut categories, "old", None);
        rename_category(&mut categories, &cat.id, "new");
        assert_eq!(categories[0].name, "new");

        rename_category(&mut categories, "ghost", "whatever");
        assert_eq!(categories.len(), 1);
    }

    #[test]
    fn add_to_category_unions_both_sides() {
        let mut categories = Vec::new();
        let cat = add_category(&mut categories, "pets", None);
        let mut images = vec![sample_image("i1"), sample_image("i2")];

        add_to_category(
            &mut images,
            &mut categories,
            &image_set(&["i1", "i2"]),
            &[cat.id.clone()],
        );

        assert_eq!(categories[0].images, vec!["i1", "i2"]);
        assert_eq!(categories[0].count, 2);
        assert_eq!(ids(&images[0].categories), vec![cat.id.as_str()]);
        assert!(membership_invariant_holds(&images, &categories));
    }

    #[test]
    fn ancestor_and_descendant_pruning() {
        let (mut images, mut categories) = chain_fixture();
        let b_id = categories[1].id.clone();
        let c_id = categories[2].id.clone();

        // Move X into the deepest category.
        add_to_category(
            &mut images,
            &mut categories,
            &image_set(&["x"]),
            &[c_id.clone()],
        );

        // X sits in C and nowhere above it.
        assert_eq!(ids(&images[0].categories), vec![c_id.as_str()]);
        assert!(categories[0].images.is_empty());
        assert_eq!(categories[0].count, 0);
        assert!(categories[1].images.is_empty());
        assert_eq!(categories[2].images, vec!["x"]);
        assert!(membership_invariant_holds(&images, &categories));

        // Moving back up to B prunes the descendant C.
        add_to_category(&mut images, &mut categories, &image_set(&["x"]), &[b_id.clone()]);
        assert_eq!(ids(&images[0].categories), vec![b_id.as_str()]);
        assert!(categories[2].images.is_empty());
        assert!(membership_invariant_holds(&images, &categories));
    }

    #[test]
    fn immediate_parent_loses_membership() {
        // A -> B; X in A; adding X to B pulls it out of A, the direct
        // father included.
        let mut categories = Vec::new();
        let a = add_category(&mut categories, "A", None);
        let b = add_category(&mut categories, "B", Some(&a.id));
        let mut images = vec![sample_image("x")];

        add_to_category(&mut images, &mut categories, &image_set(&["x"]), &[a.id.clone()]);
        add_to_category(&mut images, &mut categories, &image_set(&["x"]), &[b.id.clone()]);

        let a_ref = categories.iter().find(|c| c.id == a.id).unwrap();
        let b_ref = categories.iter().find(|c| c.id == b.id).unwrap();
        assert!(a_ref.images.is_empty());
        assert_eq!(a_ref.count, 0);
        assert_eq!(b_ref.images, vec!["x"]);
        assert_eq!(ids(&images[0].categories), vec![b.id.as_str()]);
        assert!(membership_invariant_holds(&images, &categories));
    }

    #[test]
    fn assigning_parent_and_child_together_keeps_both() {
        // When the caller explicitly targets both ends of a father link,
        // neither target prunes the other.
        let mut categories = Vec::new();
        let a = add_category(&mut categories, "A", None);
        let b = add_category(&mut categories, "B", Some(&a.id));
        let mut images = vec![sample_image("x")];

        add_to_category(
            &mut images,
            &mut categories,
            &image_set(&["x"]),
            &[a.id.clone(), b.id.clone()],
        );

        let a_ref = categories.iter().find(|c| c.id == a.id).unwrap();
        let b_ref = categories.iter().find(|c| c.id == b.id).unwrap();
        assert_eq!(a_ref.images, vec!["x"]);
        assert_eq!(b_ref.images, vec!["x"]);
        assert!(membership_invariant_holds(&images, &categories));
    }

    #[test]
    fn root_leaf_scenario() {
        // root holds img1; adding img1 to a new leaf under root empties
        // root.
        let mut categories = Vec::new();
        let root = add_category(&mut categories, "root", None);
        let mut images = vec![sample_image("img1")];
        add_to_category(
            &mut images,
            &mut categories,
            &image_set(&["img1"]),
            &[root.id.clone()],
        );

        let leaf = add_category(&mut categories, "leaf", Some(&root.id));
        add_to_category(
            &mut images,
            &mut categories,
            &image_set(&["img1"]),
            &[leaf.id.clone()],
        );

        let root_ref = categories.iter().find(|c| c.id == root.id).unwrap();
        let leaf_ref = categories.iter().find(|c| c.id == leaf.id).unwrap();
        assert!(root_ref.images.is_empty());
        assert_eq!(leaf_ref.images, vec!["img1"]);
        assert_eq!(ids(&images[0].categories), vec![leaf.id.as_str()]);
    }

    #[test]
    fn unknown_target_categories_are_ignored() {
        let mut categories = Vec::new();
        add_category(&mut categories, "only", None);
        let mut images = vec![sample_image("i1")];

        add_to_category(
            &mut images,
            &mut categories,
            &image_set(&["i1"]),
            &["ghost".to_string()],
        );
        assert!(images[0].categories.is_empty());
        assert!(categories[0].images.is_empty());
    }

    #[test]
    fn cascading_delete_removes_subtree_and_unbinds() {
        let mut categories = Vec::new();
        let a = add_category(&mut categories, "A", None);
        let b = add_category(&mut categories, "B", Some(&a.id));
        let c = add_category(&mut categories, "C", Some(&a.id));

        // A mirrors a watched folder.
        categories[0].is_bound_to_folder = true;
        categories[0].folder_path = Some("/watched/a".into());

        let mut images = vec![
            sample_image("ia"),
            sample_image("ib"),
            sample_image("ic"),
        ];
        images[0].is_bound_to_folder = true;
        add_to_category(&mut images, &mut categories, &image_set(&["ia"]), &[a.id.clone()]);
        add_to_category(&mut images, &mut categories, &image_set(&["ib"]), &[b.id.clone()]);
        add_to_category(&mut images, &mut categories, &image_set(&["ic"]), &[c.id.clone()]);

        delete_category(&mut images, &mut categories, &a.id);

        assert!(categories.is_empty());
        // Folder-bound members of A survive, unbound.
        assert!(!images[0].is_bound_to_folder);
        // Deleted ids were pruned from surviving images.
        for image in &images {
            assert!(image.categories.is_empty());
        }
        assert!(membership_invariant_holds(&images, &categories));
    }

    #[test]
    fn delete_detaches_from_father() {
        let mut categories = Vec::new();
        let a = add_category(&mut categories, "A", None);
        let b = add_category(&mut categories, "B", Some(&a.id));
        let mut images: Vec<MediaRecord> = Vec::new();

        delete_category(&mut images, &mut categories, &b.id);

        assert_eq!(categories.len(), 1);
        assert!(categories[0].children.is_empty());
    }

    #[test]
    fn delete_unknown_id_is_noop() {
        let mut categories = Vec::new();
        add_category(&mut categories, "A", None);
        let mut images = vec![sample_image("i1")];
        delete_category(&mut images, &mut categories, "ghost");
        assert_eq!(categories.len(), 1);
    }

    #[test]
    fn cyclic_links_do_not_hang() {
        // Corrupted persisted data: A and B are each other's father/child.
        let mut a = Category::new("a", "A");
        let mut b = Category::new("b", "B");
        a.father = Some("b".into());
        a.children = vec!["b".into()];
        b.father = Some("a".into());
        b.children = vec!["a".into()];
        let mut categories = vec![a, b];
        let mut images = vec![sample_image("x")];

        assert!(collect_descendants(&categories, "a").len() <= 2);
        assert!(collect_ancestors(&categories, "a").len() <= 2);

        add_to_category(
            &mut images,
            &mut categories,
            &image_set(&["x"]),
            &["a".to_string()],
        );
        delete_category(&mut images, &mut categories, "a");
        assert!(categories.is_empty());
    }

    #[test]
    fn invariant_holds_across_mixed_edit_sequence() {
        let mut categories = Vec::new();
        let a = add_category(&mut categories, "A", None);
        let b = add_category(&mut categories, "B", Some(&a.id));
        let c = add_category(&mut categories, "C", Some(&b.id));
        let d = add_category(&mut categories, "D", None);

        let mut images = vec![
            sample_image("i1"),
            sample_image("i2"),
            sample_image("i3"),
        ];

        add_to_category(
            &mut images,
            &mut categories,
            &image_set(&["i1", "i2"]),
            &[a.id.clone(), d.id.clone()],
        );
        add_to_category(&mut images, &mut categories, &image_set(&["i2"]), &[c.id.clone()]);
        add_to_category(&mut images, &mut categories, &image_set(&["i3"]), &[b.id.clone()]);
        delete_category(&mut images, &mut categories, &b.id);
        add_to_category(&mut images, &mut categories, &image_set(&["i3"]), &[d.id.clone()]);

        assert!(membership_invariant_holds(&images, &categories));
    }

    #[test]
    fn reorder_assigns_ranks() {
        let mut categories = Vec::new();
        let a = add_category(&mut categories, "A", None);
        let b = add_category(&mut categories, "B", None);
        let c = add_category(&mut categories, "C", None);

        reorder_categories(&mut categories, &[c.id.clone(), a.id.clone()]);
        let order_of = |id: &str| categories.iter().find(|x| x.id == id).unwrap().order;
        assert_eq!(order_of(&c.id), 0);
        assert_eq!(order_of(&a.id), 1);
        assert_eq!(order_of(&b.id), 2);
    }
}
