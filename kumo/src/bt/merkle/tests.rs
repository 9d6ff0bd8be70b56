use super::*;

fn hash(fill: u8) -> TreeHash {
    [fill; 32]
}

#[test]
fn test_layout() {
    let tree = MerkleTree::new(4, 2);
    assert_eq!(tree.num_leafs(), 4);
    assert_eq!(tree.num_nodes(), 7);

    // 块数不是 2 的幂时叶子向上取整
    let tree = MerkleTree::new(5, 2);
    assert_eq!(tree.num_leafs(), 8);
    assert_eq!(tree.num_nodes(), 15);
}

#[test]
fn test_dense_piece_layer() {
    let mut tree = MerkleTree::new(4, 2);
    let nodes: Vec<TreeHash> = (0u8..7).map(hash).collect();
    tree.load_tree(&nodes);

    assert_eq!(tree.root(), hash(0));
    // 每片 2 块，分片层即第二行
    assert_eq!(tree.piece_layer(), vec![hash(1), hash(2)]);
}

#[test]
fn test_dense_wrong_size_ignored() {
    let mut tree = MerkleTree::new(4, 2);
    tree.load_tree(&[hash(9); 3]);
    assert_eq!(tree.root(), [0u8; 32]);
}

#[test]
fn test_sparse_piece_layer() {
    // 5 块、每片 2 块：叶子 8，节点 15，分片层为 4 节点一行，
    // 实际分片 3 个，取前缀
    let mut tree = MerkleTree::new(5, 2);
    let mut mask = vec![false; 15];
    mask[0] = true; // 根
    mask[3] = true;
    mask[4] = true;
    mask[5] = true; // 分片层前三个
    let nodes = vec![hash(1), hash(10), hash(11), hash(12)];
    tree.load_sparse_tree(&nodes, &mask);

    assert_eq!(tree.root(), hash(1));
    assert_eq!(tree.piece_layer(), vec![hash(10), hash(11), hash(12)]);
}

#[test]
fn test_sparse_exhausted_nodes() {
    let mut tree = MerkleTree::new(4, 2);
    let mut mask = vec![false; 7];
    mask[1] = true;
    mask[2] = true;
    // 只给一个节点，其余保持全零
    tree.load_sparse_tree(&[hash(7)], &mask);
    assert_eq!(tree.piece_layer(), vec![hash(7), [0u8; 32]]);
}

#[test]
fn test_single_piece_file_layer_is_root() {
    let mut tree = MerkleTree::new(2, 4);
    let nodes: Vec<TreeHash> = (0u8..3).map(hash).collect();
    tree.load_tree(&nodes);
    assert_eq!(tree.piece_layer(), vec![hash(0)]);
}
