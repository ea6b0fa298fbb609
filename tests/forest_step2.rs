//! Partial-forest step 2: ordering and completeness of per-partition
//! outputs when every partition runs against the stored step-1 trees.

use std::path::PathBuf;

use drmx_forest::{
    load, nb_concerned, nb_trees, split_instances, store, Instance, Node, Step2Mapper, TreeId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NUM_MAPS: u32 = 5;
const NUM_TREES: u32 = 11;
const NUM_INSTANCES: usize = 100;
const NUM_ATTRIBUTES: usize = 4;

fn side_file(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("drmx-forest-{}", std::process::id()))
        .join(name)
}

fn random_instances(rng: &mut StdRng) -> Vec<Instance> {
    (0..NUM_INSTANCES)
        .map(|_| Instance::new((0..NUM_ATTRIBUTES).map(|_| rng.gen_range(0.0..1.0)).collect()))
        .collect()
}

/// Step 1 stand-in: partition `p` grows `nb_trees(p)` trees with
/// consecutive global ids; each tree splits on a random attribute and its
/// leaves are labelled with the growing partition.
fn grow_trees(rng: &mut StdRng) -> (Vec<TreeId>, Vec<Node>) {
    let mut keys = Vec::new();
    let mut trees = Vec::new();
    let mut next_id = 0;
    for partition in 0..NUM_MAPS {
        for _ in 0..nb_trees(NUM_MAPS, NUM_TREES, partition).unwrap() {
            keys.push(TreeId::new(partition, next_id).unwrap());
            let label = partition as i32;
            trees.push(Node::Numerical {
                attr: rng.gen_range(0..NUM_ATTRIBUTES),
                split: 0.5,
                lo: Box::new(Node::leaf(label)),
                hi: Box::new(Node::leaf(label)),
            });
            next_id += 1;
        }
    }
    (keys, trees)
}

#[test]
fn test_step2_output_ordering() {
    let mut rng = StdRng::seed_from_u64(1);
    let instances = random_instances(&mut rng);
    let splits = split_instances(&instances, NUM_MAPS as usize);
    let sizes: Vec<u64> = splits.iter().map(|s| s.len() as u64).collect();

    let (keys, trees) = grow_trees(&mut rng);
    // Stored out of order; loading must restore ascending ids.
    let (keys_rev, trees_rev): (Vec<_>, Vec<_>) =
        keys.iter().copied().zip(trees.iter().cloned()).rev().unzip();
    let path = side_file("ordering.json");
    store(&path, &keys_rev, &trees_rev, &sizes).unwrap();

    let mut total = 0;
    for partition in 0..NUM_MAPS {
        let loaded = load(&path, NUM_MAPS, NUM_TREES, partition).unwrap();
        assert_eq!(loaded.sizes, sizes);

        let split = &splits[partition as usize];
        let mut mapper =
            Step2Mapper::new(partition, loaded.keys, loaded.trees, split.len()).unwrap();
        for (index, instance) in split.iter().enumerate() {
            mapper.map(index, instance).unwrap();
        }
        let outputs = mapper.cleanup().unwrap();

        let expected = NUM_TREES - nb_trees(NUM_MAPS, NUM_TREES, partition).unwrap();
        assert_eq!(outputs.len() as u32, expected);
        assert_eq!(expected, nb_concerned(NUM_MAPS, NUM_TREES, partition).unwrap());

        let ids: Vec<u32> = outputs.iter().map(|(k, _)| k.tree_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids not ascending: {ids:?}");

        for (key, output) in &outputs {
            assert_eq!(key.partition(), partition);
            assert_eq!(output.predictions.len(), split.len());
            assert!(output.predictions.iter().all(|&p| p != -1));
            // Every leaf carries its growing partition, never this one.
            assert!(output.predictions.iter().all(|&p| p != partition as i32));
        }
        total += outputs.len();
    }
    // Each tree is evaluated by every partition except its own.
    assert_eq!(total, (NUM_TREES * (NUM_MAPS - 1)) as usize);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_step2_rejects_incomplete_side_file() {
    let mut rng = StdRng::seed_from_u64(2);
    let (keys, trees) = grow_trees(&mut rng);
    let path = side_file("incomplete.json");
    store(&path, &keys[..keys.len() - 1], &trees[..trees.len() - 1], &[20; 5]).unwrap();

    // Partition 0 is missing the last tree, grown by partition 4.
    assert!(load(&path, NUM_MAPS, NUM_TREES, 0).is_err());
    // Partition 4 never needed it.
    let loaded = load(&path, NUM_MAPS, NUM_TREES, 4).unwrap();
    assert_eq!(loaded.keys.len(), 9);

    let _ = std::fs::remove_file(&path);
}
