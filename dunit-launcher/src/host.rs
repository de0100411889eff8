//! Host registry - logical grouping of VMs.

use dunit_types::VmId;

use crate::Vm;

/// A logical machine holding some of the run's VMs.
#[derive(Debug, Clone)]
pub struct Host {
    index: usize,
    vms: Vec<Vm>,
}

impl Host {
    pub(crate) fn new(index: usize, vms: Vec<Vm>) -> Self {
        Self { index, vms }
    }

    /// Slot index of this host.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The VM with id `vm_id`, if it lives on this host.
    ///
    /// Identity is by VmId, so the same worker comes back before and after
    /// a bounce.
    pub fn vm(&self, vm_id: impl Into<VmId>) -> Option<&Vm> {
        let vm_id = vm_id.into();
        self.vms.iter().find(|vm| vm.vm_id() == vm_id)
    }

    /// All VMs on this host, ordered by VmId.
    pub fn vms(&self) -> &[Vm] {
        &self.vms
    }

    /// Number of VMs on this host.
    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }
}

/// All hosts in the run, built once at launch.
#[derive(Debug, Clone)]
pub struct HostRegistry {
    hosts: Vec<Host>,
}

impl HostRegistry {
    pub(crate) fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }

    /// The host in slot `index`. Every call returns the same host.
    pub fn host(&self, index: usize) -> Option<&Host> {
        self.hosts.get(index)
    }

    /// Number of hosts.
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// All hosts.
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// The VM with id `vm_id` on whichever host holds it.
    pub fn vm(&self, vm_id: impl Into<VmId>) -> Option<&Vm> {
        let vm_id = vm_id.into();
        self.hosts.iter().find_map(|host| host.vm(vm_id))
    }

    /// Every VM in the run, ordered by VmId.
    pub fn vms(&self) -> impl Iterator<Item = &Vm> {
        self.hosts.iter().flat_map(|host| host.vms().iter())
    }
}
