//! 以到达时间为键的二叉最小堆.
//!
//! 堆数组中保存体素的线性索引, 体素的 `leaf` 字段反向记录它在堆数组中的位置,
//! 从而可以在 O(log n) 内调整任意体素的位置. 不变量:
//!
//! 1. 对所有 `k > 0`, `t(leaves[k]) >= t(leaves[(k - 1) / 2])`;
//! 2. 对所有 `k`, `nodes[leaves[k]].leaf == Some(k)`.

use super::node::FmNode;

/// 堆不变量被破坏的具体位置.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HeapViolation {
    /// `nodes[node].leaf` 与其在堆中的真实位置 `leaf` 不一致.
    LeafIndexMismatch {
        /// 堆数组位置.
        leaf: usize,
        /// 体素线性索引.
        node: usize,
    },

    /// 堆中出现 NaN 或 inf 到达时间.
    NonFiniteArrival {
        /// 堆数组位置.
        leaf: usize,
        /// 到达时间.
        t: f32,
    },

    /// 子节点的到达时间小于父节点.
    OrderViolated {
        /// 子节点的堆数组位置.
        leaf: usize,
        /// 子节点到达时间.
        t: f32,
        /// 父节点到达时间.
        parent_t: f32,
    },
}

#[derive(Clone, Debug, Default)]
pub(crate) struct MinHeap {
    leaves: Vec<usize>,
}

impl MinHeap {
    #[inline]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    #[inline]
    fn swap(&mut self, nodes: &mut [FmNode], a: usize, b: usize) {
        self.leaves.swap(a, b);
        nodes[self.leaves[a]].leaf = Some(a);
        nodes[self.leaves[b]].leaf = Some(b);
    }

    /// 插入体素 `node`. 其到达时间必须已经写好.
    pub fn insert(&mut self, nodes: &mut [FmNode], node: usize) {
        self.leaves.push(node);
        let leaf = self.leaves.len() - 1;
        nodes[node].leaf = Some(leaf);
        self.up(nodes, leaf);
    }

    /// 取出到达时间最小的体素.
    pub fn pop_min(&mut self, nodes: &mut [FmNode]) -> Option<usize> {
        let last = self.leaves.len().checked_sub(1)?;
        self.swap(nodes, 0, last);
        let min = self.leaves.pop()?;
        nodes[min].leaf = None;
        if !self.leaves.is_empty() {
            self.down(nodes, 0);
        }
        Some(min)
    }

    /// 从 `leaf` 向上交换, 直到父节点不大于它.
    pub fn up(&mut self, nodes: &mut [FmNode], mut leaf: usize) {
        while leaf > 0 {
            let parent = (leaf - 1) / 2;
            if nodes[self.leaves[leaf]].t < nodes[self.leaves[parent]].t {
                self.swap(nodes, leaf, parent);
                leaf = parent;
            } else {
                break;
            }
        }
    }

    /// 从 `leaf` 向下与较小的子节点交换, 直到没有更小的子节点.
    pub fn down(&mut self, nodes: &mut [FmNode], mut leaf: usize) {
        let len = self.leaves.len();
        loop {
            let left = 2 * leaf + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut min_child = left;
            if right < len && nodes[self.leaves[left]].t > nodes[self.leaves[right]].t {
                min_child = right;
            }
            if nodes[self.leaves[min_child]].t < nodes[self.leaves[leaf]].t {
                self.swap(nodes, leaf, min_child);
                leaf = min_child;
            } else {
                break;
            }
        }
    }

    /// 清空堆, 按从后往前的顺序产出原先在堆中的体素.
    pub fn drain(&mut self) -> impl Iterator<Item = usize> + '_ {
        self.leaves.drain(..).rev()
    }

    #[cfg(test)]
    pub fn leaves(&self) -> &[usize] {
        &self.leaves
    }

    /// 检查两条不变量. 返回遇到的第一个破坏点.
    pub fn validate(&self, nodes: &[FmNode]) -> Result<(), HeapViolation> {
        for (leaf, &node) in self.leaves.iter().enumerate() {
            if nodes[node].leaf != Some(leaf) {
                return Err(HeapViolation::LeafIndexMismatch { leaf, node });
            }
            let t = nodes[node].t;
            if !t.is_finite() {
                return Err(HeapViolation::NonFiniteArrival { leaf, t });
            }
            if leaf > 0 {
                let parent_t = nodes[self.leaves[(leaf - 1) / 2]].t;
                if t < parent_t {
                    return Err(HeapViolation::OrderViolated { leaf, t, parent_t });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{HeapViolation, MinHeap};
    use crate::march::node::{FmNode, FmStatus};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn nodes_with(ts: &[f32]) -> Vec<FmNode> {
        ts.iter()
            .map(|&t| FmNode {
                status: FmStatus::Trial,
                t,
                leaf: None,
            })
            .collect()
    }

    #[test]
    fn test_pop_in_order() {
        let mut nodes = nodes_with(&[5.0, 1.0, 3.0, 4.0, 2.0, 0.5]);
        let mut heap = MinHeap::default();
        for i in 0..nodes.len() {
            heap.insert(&mut nodes, i);
        }
        assert_eq!(heap.validate(&nodes), Ok(()));

        let order: Vec<usize> = std::iter::from_fn(|| heap.pop_min(&mut nodes)).collect();
        assert_eq!(order, vec![5, 1, 4, 2, 3, 0]);
        assert!(nodes.iter().all(|n| n.leaf.is_none()));
        assert!(heap.pop_min(&mut nodes).is_none());
    }

    /// 随机插入, 随机修改键值并调整, 随机弹出. 每一步之后两条不变量都必须成立,
    /// 弹出序列必须单调不减.
    #[test]
    fn test_random_operations_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..20 {
            let n = rng.random_range(1..300);
            let mut nodes = nodes_with(&vec![0.0; n]);
            let mut heap = MinHeap::default();

            for i in 0..n {
                nodes[i].t = rng.random_range(0.0..1000.0);
                heap.insert(&mut nodes, i);
                assert_eq!(heap.validate(&nodes), Ok(()));
            }

            for _ in 0..n {
                let node = heap.leaves()[rng.random_range(0..heap.len())];
                let old = nodes[node].t;
                let new = rng.random_range(0.0..1000.0);
                nodes[node].t = new;
                let leaf = nodes[node].leaf.unwrap();
                if new < old {
                    heap.up(&mut nodes, leaf);
                } else {
                    heap.down(&mut nodes, leaf);
                }
                assert_eq!(heap.validate(&nodes), Ok(()));
            }

            let mut last = f32::MIN;
            while let Some(min) = heap.pop_min(&mut nodes) {
                assert!(nodes[min].t >= last);
                last = nodes[min].t;
                assert_eq!(heap.validate(&nodes), Ok(()));
            }
        }
    }

    #[test]
    fn test_validate_detects_violations() {
        let mut nodes = nodes_with(&[1.0, 2.0, 3.0]);
        let mut heap = MinHeap::default();
        for i in 0..3 {
            heap.insert(&mut nodes, i);
        }

        nodes[2].t = 0.5;
        assert!(matches!(
            heap.validate(&nodes),
            Err(HeapViolation::OrderViolated { leaf: 2, .. })
        ));
        nodes[2].t = 3.0;

        nodes[1].leaf = Some(0);
        assert_eq!(
            heap.validate(&nodes),
            Err(HeapViolation::LeafIndexMismatch { leaf: 1, node: 1 })
        );
        nodes[1].leaf = Some(1);

        nodes[0].t = f32::NAN;
        assert!(matches!(
            heap.validate(&nodes),
            Err(HeapViolation::NonFiniteArrival { leaf: 0, .. })
        ));
    }

    #[test]
    fn test_drain() {
        let mut nodes = nodes_with(&[1.0, 2.0, 3.0]);
        let mut heap = MinHeap::default();
        for i in 0..3 {
            heap.insert(&mut nodes, i);
        }
        let mut drained: Vec<usize> = heap.drain().collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![0, 1, 2]);
        assert!(heap.is_empty());
    }
}
