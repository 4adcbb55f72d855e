/// 构建后缀数组（倍增法，每轮 O(n log n) 排序）。
/// 文本为数值化字母表（0:$,1:A,2:C,3:G,4:T）的反转双链参考序列，
/// 可以包含多个 0 作为 contig 与链之间的分隔符；排序键只看秩，
/// 对字母表大小不敏感。
pub fn build_sa(text: &[u8]) -> Vec<u32> {
    let n = text.len();
    if n == 0 {
        return Vec::new();
    }

    let mut sa: Vec<u32> = (0..n as u32).collect();
    let mut rank: Vec<u32> = text.iter().map(|&b| b as u32).collect();
    let mut fresh = vec![0u32; n];

    let mut step = 1usize;
    loop {
        sa.sort_unstable_by_key(|&i| suffix_key(&rank, i as usize, step));

        // 依排序结果重排秩：键相同的后缀共享同一个秩
        fresh[sa[0] as usize] = 0;
        for w in 1..n {
            let prev = sa[w - 1] as usize;
            let cur = sa[w] as usize;
            let bump = (suffix_key(&rank, cur, step) != suffix_key(&rank, prev, step)) as u32;
            fresh[cur] = fresh[prev] + bump;
        }
        rank.copy_from_slice(&fresh);

        // 秩全部互异时排序已定
        if rank[sa[n - 1] as usize] as usize == n - 1 {
            break;
        }
        step <<= 1;
    }

    sa
}

/// 后缀 i 在本轮的排序键：(前半段秩, 后半段秩)。
/// 越界的后半段记 0，短后缀排在共享前缀的长后缀之前。
#[inline]
fn suffix_key(rank: &[u32], i: usize, step: usize) -> (u32, u32) {
    let tail = match rank.get(i + step) {
        Some(&r) => r + 1,
        None => 0,
    };
    (rank[i], tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sa_basic() {
        // 文本：A C G T $  -> 1 2 3 4 0
        let text = [1u8, 2, 3, 4, 0];
        let sa = build_sa(&text);
        // 期望：后缀按字典序：$, A$, C$, G$, T$
        assert_eq!(sa, vec![4, 0, 1, 2, 3]);
    }

    #[test]
    fn sa_with_multiple_sentinels() {
        // A C $ G A $ -> 含两个分隔符的文本
        let text = [1u8, 2, 0, 3, 1, 0];
        let sa = build_sa(&text);
        assert_eq!(sa.len(), 6);
        // 所有后缀必须按字典序排列
        for w in sa.windows(2) {
            let a = &text[w[0] as usize..];
            let b = &text[w[1] as usize..];
            assert!(a <= b, "suffix order violated: {:?} > {:?}", a, b);
        }
    }

    #[test]
    fn sa_of_repetitive_text() {
        // 高重复文本需要多轮倍增才能区分
        let text = [1u8, 1, 1, 1, 2, 1, 1, 1, 1, 0];
        let sa = build_sa(&text);
        assert_eq!(sa.len(), 10);
        for w in sa.windows(2) {
            assert!(&text[w[0] as usize..] <= &text[w[1] as usize..]);
        }
    }
}
