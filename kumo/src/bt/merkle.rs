//! v2 哈希树的重建。
//!
//! 节点按堆序存放：根为 0，含 n 个节点的一行占据 `[n-1, 2n-1)`。
//! 叶子数取块数向上取整到 2 的幂。这里只做纯下标运算，
//! 不负责校验哈希本身。

#[cfg(test)]
mod tests;

/// 树节点哈希（sha256）
pub type TreeHash = [u8; 32];

/// 单个文件的哈希树
#[derive(Debug, Clone)]
pub struct MerkleTree {
    num_blocks: u64,
    blocks_per_piece: u64,
    nodes: Vec<TreeHash>,
}

impl MerkleTree {
    pub fn new(num_blocks: u64, blocks_per_piece: u64) -> Self {
        let num_leafs = num_blocks.max(1).next_power_of_two();
        Self {
            num_blocks,
            blocks_per_piece: blocks_per_piece.max(1),
            nodes: vec![[0u8; 32]; (num_leafs * 2 - 1) as usize],
        }
    }

    /// 叶子数（2 的幂）
    pub fn num_leafs(&self) -> u64 {
        (self.nodes.len() as u64 + 1) / 2
    }

    /// 节点总数
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> TreeHash {
        self.nodes[0]
    }

    /// 装入完整的稠密节点数组。长度不符时忽略。
    pub fn load_tree(&mut self, nodes: &[TreeHash]) {
        if nodes.len() != self.nodes.len() {
            return;
        }
        self.nodes.copy_from_slice(nodes);
    }

    /// 装入稀疏节点数组。`mask` 按节点下标标记哪些节点存在，
    /// `nodes` 按 mask 的顺序依次消费；长度不符时忽略。
    pub fn load_sparse_tree(&mut self, nodes: &[TreeHash], mask: &[bool]) {
        if mask.len() != self.nodes.len() {
            return;
        }
        let mut next = nodes.iter();
        for (index, _) in mask.iter().enumerate().filter(|&(_, &set)| set) {
            match next.next() {
                Some(node) => self.nodes[index] = *node,
                None => break,
            }
        }
    }

    /// 分片层：每个节点覆盖 `blocks_per_piece` 个叶子的那一行，
    /// 只取实际分片数对应的前缀。缺失的节点保持全零。
    pub fn piece_layer(&self) -> Vec<TreeHash> {
        let num_leafs = self.num_leafs();
        if self.blocks_per_piece >= num_leafs {
            return vec![self.root()];
        }
        let row_len = (num_leafs / self.blocks_per_piece) as usize;
        let start = row_len - 1;
        let num_pieces = self.num_blocks.div_ceil(self.blocks_per_piece) as usize;
        self.nodes[start..start + num_pieces].to_vec()
    }
}
