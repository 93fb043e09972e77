use super::FaceRegion;

/// Cluster candidate windows and average each cluster, keeping clusters with
/// more than `min_neighbors` members. Clusters nested inside a stronger
/// cluster are suppressed. Output follows the order in which clusters first
/// appear among the candidates.
pub fn group_rectangles(rects: Vec<FaceRegion>, min_neighbors: usize, eps: f64) -> Vec<FaceRegion> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects;
    }

    let (labels, class_count) = partition(&rects, |a, b| similar(a, b, eps));

    let mut sums = vec![[0i64; 4]; class_count];
    let mut counts = vec![0usize; class_count];
    for (rect, &label) in rects.iter().zip(&labels) {
        let sum = &mut sums[label];
        sum[0] += rect.x as i64;
        sum[1] += rect.y as i64;
        sum[2] += rect.width as i64;
        sum[3] += rect.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<FaceRegion> = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &count)| {
            let mean = |v: i64| (v as f64 / count as f64).round() as u32;
            FaceRegion {
                x: mean(sum[0]),
                y: mean(sum[1]),
                width: mean(sum[2]),
                height: mean(sum[3]),
            }
        })
        .collect();

    (0..class_count)
        .filter(|&i| counts[i] > min_neighbors)
        .filter(|&i| {
            let (inner, n1) = (&averaged[i], counts[i]);
            !(0..class_count).any(|j| {
                let n2 = counts[j];
                j != i
                    && n2 > min_neighbors
                    && nested(inner, &averaged[j], eps)
                    && (n2 > n1.max(3) || n1 < 3)
            })
        })
        .map(|i| averaged[i])
        .collect()
}

/// Two windows match when every edge lies within a tolerance scaled by the
/// smaller window.
fn similar(a: &FaceRegion, b: &FaceRegion, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) as f64 + a.height.min(b.height) as f64) * 0.5;
    let within = |p: i64, q: i64| ((p - q).abs() as f64) <= delta;

    within(a.x as i64, b.x as i64)
        && within(a.y as i64, b.y as i64)
        && within(a.right(), b.right())
        && within(a.bottom(), b.bottom())
}

/// `inner` lies inside `outer` expanded by `eps` of its size
fn nested(inner: &FaceRegion, outer: &FaceRegion, eps: f64) -> bool {
    let dx = (outer.width as f64 * eps).round() as i64;
    let dy = (outer.height as f64 * eps).round() as i64;

    inner.x as i64 >= outer.x as i64 - dx
        && inner.y as i64 >= outer.y as i64 - dy
        && inner.right() <= outer.right() + dx
        && inner.bottom() <= outer.bottom() + dy
}

/// Union-find equivalence partition. Labels are numbered by first appearance.
fn partition<F>(items: &[FaceRegion], same: F) -> (Vec<usize>, usize)
where
    F: Fn(&FaceRegion, &FaceRegion) -> bool,
{
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut parent: Vec<usize> = (0..items.len()).collect();
    for i in 0..items.len() {
        for j in (i + 1)..items.len() {
            if same(&items[i], &items[j]) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    let mut class_of_root = vec![usize::MAX; items.len()];
    let mut class_count = 0;
    let labels = (0..items.len())
        .map(|i| {
            let root = find(&mut parent, i);
            if class_of_root[root] == usize::MAX {
                class_of_root[root] = class_count;
                class_count += 1;
            }
            class_of_root[root]
        })
        .collect();

    (labels, class_count)
}
