//! The fixed C prelude every emitted translation unit begins with.
//!
//! This is the runtime ABI contract: primitive typedefs, the panic and
//! bounds-check helpers, allocation helpers, the generic hash map, and the
//! entry-point wrapper. The surrounding C compiler sees this text verbatim
//! before any user code.
//!
//! The hash map is a separate-chaining table keyed through caller-supplied
//! key-size, hash and compare functions, so one implementation serves every
//! key type the language permits.

/// Emitted once at the top of every translation unit.
pub const C_RUNTIME: &str = r#"#include <stdarg.h>
#include <stdbool.h>
#include <stdint.h>
#include <stdio.h>
#include <stdlib.h>
#include <string.h>

typedef int8_t __truk_i8;
typedef int16_t __truk_i16;
typedef int32_t __truk_i32;
typedef int64_t __truk_i64;
typedef uint8_t __truk_u8;
typedef uint16_t __truk_u16;
typedef uint32_t __truk_u32;
typedef uint64_t __truk_u64;
typedef float __truk_f32;
typedef double __truk_f64;
typedef bool __truk_bool;

#define __truk_void void

#ifdef __cplusplus
extern "C" {
#endif

static __truk_void __truk_runtime_sxs_panic(const char *msg, __truk_u64 len) {
  fprintf(stderr, "panic: %.*s\n", (int)len, msg);
  exit(1);
}

static inline __truk_void __truk_runtime_sxs_bounds_check(__truk_u64 idx,
                                                          __truk_u64 len) {
  if (idx >= len) {
    fprintf(stderr, "panic: index out of bounds: %llu >= %llu\n",
            (unsigned long long)idx, (unsigned long long)len);
    exit(1);
  }
}

static inline __truk_void *__truk_runtime_sxs_alloc(__truk_u64 size) {
  return malloc(size);
}

static inline __truk_void __truk_runtime_sxs_free(__truk_void *ptr) {
  free(ptr);
}

static inline __truk_void *__truk_runtime_sxs_alloc_array(__truk_u64 elem_size,
                                                          __truk_u64 count) {
  return malloc(elem_size * count);
}

static inline __truk_void __truk_runtime_sxs_free_array(__truk_void *ptr) {
  free(ptr);
}

static inline __truk_u64 __truk_runtime_sxs_sizeof_type(__truk_u64 size) {
  return size;
}

typedef __truk_i32 (*__truk_runtime_sxs_entry_fn_no_args)(__truk_void);
typedef __truk_i32 (*__truk_runtime_sxs_entry_fn_with_args)(__truk_i32 argc,
                                                            __truk_i8 **argv);

typedef struct {
  __truk_void *entry_fn;
  __truk_bool has_args;
  __truk_i32 argc;
  __truk_i8 **argv;
} __truk_runtime_sxs_target_app_s;

static __truk_i32 __truk_runtime_sxs_start(__truk_runtime_sxs_target_app_s *app) {
  if (app->has_args) {
    __truk_runtime_sxs_entry_fn_with_args entry =
        (__truk_runtime_sxs_entry_fn_with_args)app->entry_fn;
    return entry(app->argc, app->argv);
  } else {
    __truk_runtime_sxs_entry_fn_no_args entry =
        (__truk_runtime_sxs_entry_fn_no_args)app->entry_fn;
    return entry();
  }
}

#ifdef __cplusplus
}
#endif

#define TRUK_PANIC(msg, len) __truk_runtime_sxs_panic((const char *)(msg), (len))
#define TRUK_BOUNDS_CHECK(idx, len) __truk_runtime_sxs_bounds_check((idx), (len))

/* ------------------------------------------------------------------ */
/* Generic hash map: separate chaining, parameterized by key size,    */
/* hash function and compare function.                                */
/* ------------------------------------------------------------------ */

struct __truk_map_node_t;
typedef struct __truk_map_node_t __truk_map_node_t;

typedef unsigned (*__truk_map_hash_fn)(const void *key, int ksize);
typedef int (*__truk_map_cmp_fn)(const void *a, const void *b, int ksize);

typedef struct {
  __truk_map_node_t **buckets;
  unsigned nbuckets, nnodes;
  int ksize;
  __truk_map_hash_fn hash_fn;
  __truk_map_cmp_fn cmp_fn;
} __truk_map_base_t;

typedef struct {
  unsigned bucketidx;
  __truk_map_node_t *node;
} __truk_map_iter_t;

struct __truk_map_node_t {
  unsigned hash;
  void *value;
  __truk_map_node_t *next;
};

#define __truk_map_t(T)                                                        \
  struct {                                                                     \
    __truk_map_base_t base;                                                    \
    T *ref;                                                                    \
    T tmp;                                                                     \
  }

#define __truk_map_init_generic(m, keysize, hashfn, cmpfn)                     \
  do {                                                                         \
    memset(m, 0, sizeof(*(m)));                                                \
    (m)->base.ksize = (keysize);                                               \
    (m)->base.hash_fn = (hashfn);                                              \
    (m)->base.cmp_fn = (cmpfn);                                                \
  } while (0)

#define __truk_map_deinit(m) __truk_map_deinit_(&(m)->base)

#define __truk_map_get_generic(m, key)                                         \
  ((m)->ref = __truk_map_get_(&(m)->base, key))

#define __truk_map_set_generic(m, key, value)                                  \
  ((m)->tmp = (value),                                                         \
   __truk_map_set_(&(m)->base, key, &(m)->tmp, sizeof((m)->tmp)))

#define __truk_map_remove_generic(m, key) __truk_map_remove_(&(m)->base, key)

#define __truk_map_iter() __truk_map_iter_()

#define __truk_map_next_generic(m, iter) __truk_map_next_(&(m)->base, iter)

static unsigned __truk_map_hash_str(const void *key, int ksize) {
  const char *str = *(const char *const *)key;
  unsigned hash = 5381;
  (void)ksize;
  while (*str) {
    hash = ((hash << 5) + hash) ^ (unsigned char)*str++;
  }
  return hash;
}

static unsigned __truk_map_hash_mem_(const void *key, int ksize) {
  const unsigned char *bytes = (const unsigned char *)key;
  unsigned hash = 5381;
  int i;
  for (i = 0; i < ksize; i++) {
    hash = ((hash << 5) + hash) ^ bytes[i];
  }
  return hash;
}

static unsigned __truk_map_hash_i8(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_i16(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_i32(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_i64(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_u8(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_u16(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_u32(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_u64(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_f32(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_f64(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }
static unsigned __truk_map_hash_bool(const void *key, int ksize) { return __truk_map_hash_mem_(key, ksize); }

static int __truk_map_cmp_str(const void *a, const void *b, int ksize) {
  (void)ksize;
  return strcmp(*(const char *const *)a, *(const char *const *)b);
}

static int __truk_map_cmp_mem(const void *a, const void *b, int ksize) {
  return memcmp(a, b, ksize);
}

static int __truk_map_key_width_(const __truk_map_base_t *m) {
  return (m->cmp_fn == __truk_map_cmp_str) ? (int)sizeof(char *) : m->ksize;
}

static __truk_map_node_t *__truk_map_newnode_(const __truk_map_base_t *m,
                                              const void *key, void *value,
                                              int vsize) {
  __truk_map_node_t *node;
  int kwidth = __truk_map_key_width_(m);
  int voffset = kwidth + ((int)(sizeof(void *) - (size_t)kwidth % sizeof(void *)) % (int)sizeof(void *));
  node = (__truk_map_node_t *)malloc(sizeof(*node) + voffset + vsize);
  if (!node)
    return NULL;
  memcpy(node + 1, key, kwidth);
  node->hash = m->hash_fn(key, m->ksize);
  node->value = ((char *)(node + 1)) + voffset;
  memcpy(node->value, value, vsize);
  return node;
}

static int __truk_map_bucketidx_(__truk_map_base_t *m, unsigned hash) {
  return hash & (m->nbuckets - 1);
}

static void __truk_map_addnode_(__truk_map_base_t *m, __truk_map_node_t *node) {
  int n = __truk_map_bucketidx_(m, node->hash);
  node->next = m->buckets[n];
  m->buckets[n] = node;
}

static int __truk_map_resize_(__truk_map_base_t *m, int nbuckets) {
  __truk_map_node_t *nodes, *node, *next;
  __truk_map_node_t **buckets;
  int i;
  nodes = NULL;
  i = m->nbuckets;
  while (i--) {
    node = (m->buckets)[i];
    while (node) {
      next = node->next;
      node->next = nodes;
      nodes = node;
      node = next;
    }
  }
  buckets = (__truk_map_node_t **)realloc(m->buckets, sizeof(*m->buckets) * nbuckets);
  if (buckets != NULL) {
    m->buckets = buckets;
    m->nbuckets = nbuckets;
  }
  if (m->buckets) {
    memset(m->buckets, 0, sizeof(*m->buckets) * m->nbuckets);
    node = nodes;
    while (node) {
      next = node->next;
      __truk_map_addnode_(m, node);
      node = next;
    }
  }
  return (buckets == NULL) ? -1 : 0;
}

static __truk_map_node_t **__truk_map_getref_(__truk_map_base_t *m,
                                              const void *key) {
  unsigned hash = m->hash_fn(key, m->ksize);
  __truk_map_node_t **next;
  if (m->nbuckets > 0) {
    next = &m->buckets[__truk_map_bucketidx_(m, hash)];
    while (*next) {
      if ((*next)->hash == hash &&
          m->cmp_fn((const void *)(*next + 1), key, m->ksize) == 0) {
        return next;
      }
      next = &(*next)->next;
    }
  }
  return NULL;
}

static void __truk_map_deinit_(__truk_map_base_t *m) {
  __truk_map_node_t *next, *node;
  int i;
  i = m->nbuckets;
  while (i--) {
    node = m->buckets[i];
    while (node) {
      next = node->next;
      free(node);
      node = next;
    }
  }
  free(m->buckets);
}

static void *__truk_map_get_(__truk_map_base_t *m, const void *key) {
  __truk_map_node_t **next = __truk_map_getref_(m, key);
  return next ? (*next)->value : NULL;
}

static int __truk_map_set_(__truk_map_base_t *m, const void *key, void *value,
                           int vsize) {
  int n, err;
  __truk_map_node_t **next, *node;
  next = __truk_map_getref_(m, key);
  if (next) {
    memcpy((*next)->value, value, vsize);
    return 0;
  }
  node = __truk_map_newnode_(m, key, value, vsize);
  if (node == NULL)
    goto fail;
  if (m->nnodes >= m->nbuckets) {
    n = (m->nbuckets > 0) ? (m->nbuckets << 1) : 1;
    err = __truk_map_resize_(m, n);
    if (err)
      goto fail;
  }
  __truk_map_addnode_(m, node);
  m->nnodes++;
  return 0;
fail:
  if (node)
    free(node);
  return -1;
}

static void __truk_map_remove_(__truk_map_base_t *m, const void *key) {
  __truk_map_node_t *node;
  __truk_map_node_t **next = __truk_map_getref_(m, key);
  if (next) {
    node = *next;
    *next = (*next)->next;
    free(node);
    m->nnodes--;
  }
}

static __truk_map_iter_t __truk_map_iter_(void) {
  __truk_map_iter_t iter;
  iter.bucketidx = (unsigned)-1;
  iter.node = NULL;
  return iter;
}

static void *__truk_map_next_(__truk_map_base_t *m, __truk_map_iter_t *iter) {
  if (iter->node) {
    iter->node = iter->node->next;
    if (iter->node == NULL)
      goto nextBucket;
  } else {
  nextBucket:
    do {
      if (++iter->bucketidx >= m->nbuckets) {
        return NULL;
      }
      iter->node = m->buckets[iter->bucketidx];
    } while (iter->node == NULL);
  }
  return (void *)(iter->node + 1);
}

"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_declares_the_runtime_abi() {
        for symbol in [
            "__truk_runtime_sxs_panic",
            "__truk_runtime_sxs_bounds_check",
            "__truk_runtime_sxs_alloc",
            "__truk_runtime_sxs_free",
            "__truk_runtime_sxs_alloc_array",
            "__truk_runtime_sxs_free_array",
            "__truk_runtime_sxs_start",
            "__truk_runtime_sxs_target_app_s",
            "__truk_map_init_generic",
            "__truk_map_set_generic",
            "__truk_map_get_generic",
            "__truk_map_remove_generic",
            "__truk_map_next_generic",
            "__truk_map_hash_str",
            "__truk_map_hash_i8",
            "__truk_map_hash_f64",
            "__truk_map_hash_bool",
            "__truk_map_cmp_str",
            "__truk_map_cmp_mem",
            "TRUK_PANIC",
            "TRUK_BOUNDS_CHECK",
        ] {
            assert!(C_RUNTIME.contains(symbol), "prelude is missing {}", symbol);
        }
    }

    #[test]
    fn prelude_typedefs_every_primitive() {
        for ty in [
            "__truk_i8", "__truk_i16", "__truk_i32", "__truk_i64", "__truk_u8",
            "__truk_u16", "__truk_u32", "__truk_u64", "__truk_f32", "__truk_f64",
            "__truk_bool", "__truk_void",
        ] {
            assert!(C_RUNTIME.contains(ty), "prelude is missing {}", ty);
        }
    }
}
